use meshcall_core::{CodecError, PeerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to the relay")]
    NotConnected,

    #[error("no session joined on this transport")]
    NotJoined,

    #[error("transport closed")]
    Closed,

    #[error("frame encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("relay I/O failed: {0}")]
    Io(String),
}

/// Errors surfaced to callers of the session engine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("screen share already held by {0}")]
    ScreenShareHeld(PeerId),

    #[error("nobody is sharing a screen")]
    NoScreenShare,

    #[error("recording already active")]
    RecordingActive,

    #[error("recording is not active")]
    RecordingInactive,

    #[error("only the president may {0}")]
    NotPermitted(&'static str),

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("link to {0} failed: {1}")]
    Link(PeerId, String),

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session engine has stopped")]
    Stopped,
}
