use async_trait::async_trait;
use meshcall_core::{IceCandidate, PeerId};
use tokio::sync::mpsc;

/// Identifies one link instance. `epoch` changes every time a peer's link
/// is replaced, so late events from a discarded link can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub peer_id: PeerId,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
    Screen,
}

/// A local media track offered to every peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// Events a link raises for the session loop.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A local ICE candidate that has to reach the remote peer.
    CandidateGenerated(ConnectionHandle, IceCandidate),

    /// The remote side started sending a track.
    RemoteTrack(ConnectionHandle, String),

    /// ICE or DTLS gave up. Terminal for the link.
    Failed(ConnectionHandle),
}

impl LinkEvent {
    pub fn handle(&self) -> ConnectionHandle {
        match self {
            LinkEvent::CandidateGenerated(handle, _)
            | LinkEvent::RemoteTrack(handle, _)
            | LinkEvent::Failed(handle) => *handle,
        }
    }
}

/// One direct media connection to a remote peer.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Makes the set of sent tracks equal `tracks`: stale senders are
    /// removed, missing ones added.
    async fn sync_tracks(&self, tracks: &[LocalTrack]) -> anyhow::Result<()>;

    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> anyhow::Result<String>;

    /// Creates an answer and installs it as the local description.
    async fn create_answer(&self) -> anyhow::Result<String>;

    async fn set_remote_description(&self, description: SessionDescription)
    -> anyhow::Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    /// Abandons an outstanding local offer.
    async fn rollback(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn create(
        &self,
        handle: ConnectionHandle,
        events: mpsc::Sender<LinkEvent>,
    ) -> anyhow::Result<Box<dyn PeerLink>>;
}
