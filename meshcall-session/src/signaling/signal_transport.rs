use crate::error::TransportError;
use async_trait::async_trait;
use meshcall_core::{JoinRequest, Topic};

/// What a relay connection reports to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The relay is reachable. Raised again after every reconnect.
    Connected,

    /// The relay became unreachable. The transport keeps trying.
    Disconnected,

    /// An encoded envelope delivered on `topic`.
    Frame { topic: Topic, frame: String },
}

/// Delivery contract the engine needs from the publish/subscribe relay.
///
/// Frames published on one topic reach every subscriber in publish order.
/// Nothing is promised across topics. Inbound traffic is delivered on the
/// channel handed out together with the transport.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Requests membership of a session. Sent again after each reconnect.
    async fn join(&self, request: JoinRequest) -> Result<(), TransportError>;

    async fn publish(&self, topic: Topic, frame: String) -> Result<(), TransportError>;

    /// Leaves the session and releases the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
