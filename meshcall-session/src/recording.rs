use crate::collab::{ArtifactSink, AudioCapture, RecordingArtifact};
use crate::error::SessionError;
use meshcall_core::{PeerId, Sender, SessionCode, Signal};
use std::sync::Arc;
use tracing::{info, warn};

/// Owner of the session-wide recording flag and of the local capture that
/// follows it.
pub struct RecordingCoordinator {
    session_code: SessionCode,
    local: PeerId,
    active: bool,
    capturing: bool,
    capture: Box<dyn AudioCapture>,
    sink: Arc<dyn ArtifactSink>,
}

impl RecordingCoordinator {
    pub fn new(
        session_code: SessionCode,
        local: PeerId,
        capture: Box<dyn AudioCapture>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            session_code,
            local,
            active: false,
            capturing: false,
            capture,
            sink,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Flips recording on. The returned signals must be broadcast in
    /// order, and only then [`RecordingCoordinator::start_capture`] called:
    /// every floor is cleared before recording is announced.
    pub fn begin(&mut self, initiator: &Sender) -> Result<Vec<Signal>, SessionError> {
        if !initiator.is_president() {
            return Err(SessionError::NotPermitted("start recording"));
        }
        if self.active {
            return Err(SessionError::RecordingActive);
        }

        info!("Recording started by {}", initiator.peer_id);
        self.active = true;
        Ok(vec![
            Signal::ClearMic,
            Signal::ToggleRecording { active: true },
        ])
    }

    /// Flips recording off. A capture in flight is finalized and handed to
    /// the sink before the stop signal is returned.
    pub async fn stop(&mut self, initiator: &Sender) -> Result<Signal, SessionError> {
        if !initiator.is_president() {
            return Err(SessionError::NotPermitted("stop recording"));
        }
        if !self.active {
            return Err(SessionError::RecordingInactive);
        }

        self.finish_capture().await;
        self.active = false;
        info!("Recording stopped by {}", initiator.peer_id);
        Ok(Signal::ToggleRecording { active: false })
    }

    /// Reacts to a `toggle-recording` broadcast. Non-president senders are
    /// ignored. Returns whether the flag changed.
    pub async fn on_remote_toggle(&mut self, sender: &Sender, active: bool) -> bool {
        if !sender.is_president() {
            warn!(
                "Ignoring toggle-recording from non-president {}",
                sender.peer_id
            );
            return false;
        }
        self.apply(active).await
    }

    /// Adopts an active recording reported by a `user-state` reply.
    pub async fn adopt(&mut self) -> bool {
        self.apply(true).await
    }

    /// Drops a recording flag that no peer confirmed after a resync,
    /// saving whatever was captured.
    pub async fn withdraw(&mut self) -> bool {
        if self.active {
            info!("Recording no longer reported by any peer");
        }
        self.apply(false).await
    }

    async fn apply(&mut self, active: bool) -> bool {
        if active == self.active {
            return false;
        }
        if active {
            self.active = true;
            if let Err(e) = self.start_capture().await {
                warn!("{}", e);
            }
        } else {
            self.finish_capture().await;
            self.active = false;
        }
        true
    }

    pub async fn start_capture(&mut self) -> Result<(), SessionError> {
        if self.capturing {
            return Ok(());
        }
        self.capture
            .start()
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))?;
        self.capturing = true;
        info!("Local audio capture started");
        Ok(())
    }

    /// Finalizes the running capture, if any, and saves it.
    pub async fn finish_capture(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;

        match self.capture.finish().await {
            Ok(audio) => {
                info!("Local audio capture finished ({} bytes)", audio.len());
                self.sink.save_recording(RecordingArtifact {
                    session_code: self.session_code.clone(),
                    peer_id: self.local,
                    audio,
                });
            }
            Err(e) => warn!("Failed to finalize audio capture: {}", e),
        }
    }
}
