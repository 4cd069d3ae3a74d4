use crate::model::session::{JoinRequest, Topic};
use serde::{Deserialize, Serialize};

/// Client -> relay frame on the WebSocket relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ClientFrame {
    Join(JoinRequest),
    Publish { topic: Topic, frame: String },
    Leave,
}

/// Relay -> client frame on the WebSocket relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ServerFrame {
    Deliver { topic: Topic, frame: String },
}
