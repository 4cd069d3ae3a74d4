use serde::{Deserialize, Serialize};

/// Per-peer negotiation state.
///
/// ```text
/// New -> Offering | Answering -> Connected <-> Renegotiating -> Closed
/// ```
/// Every state may fall into `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    New,
    Offering,
    Answering,
    Connected,
    Renegotiating,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (New, Offering) | (New, Answering) => true,
            (Offering, Connected) | (Answering, Connected) => true,
            (Connected, Renegotiating) | (Renegotiating, Connected) => true,
            _ => false,
        }
    }

    /// An offer of ours is outstanding.
    pub fn is_offering(self) -> bool {
        matches!(self, ConnectionState::Offering | ConnectionState::Renegotiating)
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Which side issues the first offer on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationRole {
    Initiator,
    Receiver,
}
