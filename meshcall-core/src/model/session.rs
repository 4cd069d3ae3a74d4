use crate::model::peer::{PeerId, Profile, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(pub String);

impl SessionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery channels of one session on the relay.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "peer", rename_all = "kebab-case")]
pub enum Topic {
    /// Handshake and session-state signals, fanned out to every member.
    Broadcast,
    /// Offer / answer / ICE traffic, fanned out to every member.
    Relay,
    /// Queue read only by the given peer.
    Personal(PeerId),
}

/// Sent once per connection so the relay grants membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub session_code: SessionCode,
    pub peer_id: PeerId,
    pub profile: Profile,
    pub role: Role,
}
