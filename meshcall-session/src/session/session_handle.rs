use crate::directory::Peer;
use crate::error::SessionError;
use crate::reconcile::ReconcileStatus;
use crate::session::{Reply, SessionCommand};
use crate::transport::LocalTrack;
use meshcall_core::{ConnectionState, PeerId, Sender, SessionState};
use std::collections::BTreeSet;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Reachability of the relay, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    /// The relay dropped; signaling is suspended and outbound frames queue.
    Reconnecting,
    Closed,
}

/// Notifications for the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerJoined(Sender),
    PeerLeft(PeerId),
    PeerConnected(PeerId),
    /// The media link failed and the peer was dropped from the directory.
    PeerFailed(PeerId),
    RemoteTrack { peer_id: PeerId, track_id: String },
    StateChanged(SessionState),
    /// A lower peer id claimed the screen-share slot we held.
    ScreenShareLost { winner: PeerId },
    /// A clear directive released the local floor.
    FloorCleared,
    RecordingChanged(bool),
    Chat { from: Sender, body: String },
    /// The `request-state` round after a join has ended.
    Reconciled(SessionState),
}

/// Point-in-time copy of the engine's view.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub local: Sender,
    pub status: SessionStatus,
    pub state: SessionState,
    pub reconcile: ReconcileStatus,
    pub peers: Vec<Peer>,
    pub media_ready: bool,
}

impl SessionSnapshot {
    pub fn peer(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.peer_id == peer_id)
    }

    pub fn connected_peers(&self) -> BTreeSet<PeerId> {
        self.peers
            .iter()
            .filter(|p| p.connection_state == ConnectionState::Connected)
            .map(|p| p.peer_id)
            .collect()
    }
}

/// Cloneable front door to a running [`crate::session::SessionCoordinator`].
#[derive(Clone)]
pub struct SessionHandle {
    local: Sender,
    command_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub(crate) fn new(
        local: Sender,
        command_tx: mpsc::Sender<SessionCommand>,
        event_tx: broadcast::Sender<SessionEvent>,
        status_rx: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            local,
            command_tx,
            event_tx,
            status_rx,
        }
    }

    pub fn local(&self) -> &Sender {
        &self.local
    }

    pub fn peer_id(&self) -> PeerId {
        self.local.peer_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub async fn set_local_tracks(&self, tracks: Vec<LocalTrack>) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::SetLocalTracks { tracks, reply })
            .await
    }

    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::SetMicrophoneEnabled { enabled, reply })
            .await
    }

    pub async fn raise_hand(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::RaiseHand { reply }).await
    }

    pub async fn lower_hand(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::LowerHand { reply }).await
    }

    pub async fn take_floor(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::TakeFloor { reply }).await
    }

    pub async fn release_floor(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::ReleaseFloor { reply }).await
    }

    pub async fn revoke_all_floors(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::RevokeAllFloors { reply })
            .await
    }

    /// Fails with [`SessionError::ScreenShareHeld`] when someone else
    /// holds the slot.
    pub async fn acquire_screen_share(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::AcquireScreenShare { reply })
            .await
    }

    pub async fn release_screen_share(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::ReleaseScreenShare { reply })
            .await
    }

    pub async fn screen_capture_ended(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::ScreenCaptureEnded { reply })
            .await
    }

    pub async fn request_screen(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::RequestScreen { reply })
            .await
    }

    pub async fn start_recording(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::StartRecording { reply })
            .await
    }

    /// Returns once the local capture has been finalized.
    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::StopRecording { reply })
            .await
    }

    pub async fn send_chat(&self, body: impl Into<String>) -> Result<(), SessionError> {
        let body = body.into();
        self.call(|reply| SessionCommand::SendChat { body, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    pub async fn leave(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Leave { reply }).await
    }

    async fn call(
        &self,
        command: impl FnOnce(Reply) -> SessionCommand,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }
}
