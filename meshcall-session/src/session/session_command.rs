use crate::error::SessionError;
use crate::session::SessionSnapshot;
use crate::transport::LocalTrack;
use tokio::sync::oneshot;

pub type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Requests from the application to the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Declares the local media tracks; the first call signals readiness.
    SetLocalTracks { tracks: Vec<LocalTrack>, reply: Reply },

    /// Mutes or unmutes the local microphone. Never renegotiates.
    SetMicrophoneEnabled { enabled: bool, reply: Reply },

    RaiseHand { reply: Reply },

    LowerHand { reply: Reply },

    TakeFloor { reply: Reply },

    ReleaseFloor { reply: Reply },

    /// President only.
    RevokeAllFloors { reply: Reply },

    AcquireScreenShare { reply: Reply },

    ReleaseScreenShare { reply: Reply },

    /// The local capture stream ended on its own.
    ScreenCaptureEnded { reply: Reply },

    /// Asks the current sharer to renegotiate so its screen reaches us.
    RequestScreen { reply: Reply },

    StartRecording { reply: Reply },

    StopRecording { reply: Reply },

    SendChat { body: String, reply: Reply },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    /// Broadcasts `user-left`, tears everything down and stops the loop.
    Leave { reply: Reply },
}
