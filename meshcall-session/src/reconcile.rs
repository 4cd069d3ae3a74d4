use crate::floor::{FloorControl, SlotChange};
use meshcall_core::{PeerId, Signal, UserState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// No `request-state` round has been started.
    Idle,
    /// Replies are being folded; silent peers make a fixed quorum
    /// impossible, so the round ends at `deadline`.
    Pending { deadline: Instant },
    Settled,
}

/// What folding one `user-state` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Folded {
    pub slot: SlotChange,
    /// The reply vouches for an active recording.
    pub recording: bool,
}

/// Late-join state transfer: asks the session for its state, answers such
/// requests from others, and folds replies into the local projection.
///
/// Floor flags from replies that arrive after the round settled are still
/// folded. The recording flag is only taken from a reply addressed to us
/// while our round is open.
#[derive(Debug)]
pub struct StateReconciler {
    timeout: Duration,
    status: ReconcileStatus,
    replies: usize,
    /// Recording was on when a resync round began and no reply has
    /// confirmed it yet.
    recording_unconfirmed: bool,
}

impl StateReconciler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            status: ReconcileStatus::Idle,
            replies: 0,
            recording_unconfirmed: false,
        }
    }

    /// Starts a new round and returns the request to broadcast.
    pub fn begin(&mut self, now: Instant) -> Signal {
        self.status = ReconcileStatus::Pending {
            deadline: now + self.timeout,
        };
        self.replies = 0;
        debug!("Requesting session state");
        Signal::RequestState
    }

    /// Starts a round after a relay reconnect. Whatever other peers held
    /// before the drop is forgotten and rebuilt from the replies; an active
    /// recording survives only if some reply still reports it.
    pub fn begin_resync(
        &mut self,
        floor: &mut FloorControl,
        recording_active: bool,
        now: Instant,
    ) -> Signal {
        floor.reset_remote();
        self.recording_unconfirmed = recording_active;
        self.begin(now)
    }

    /// The reply to someone else's `request-state`. Peers without a
    /// non-default flag stay silent.
    pub fn answer_for(&self, contribution: UserState) -> Option<Signal> {
        if contribution.is_default() {
            return None;
        }
        Some(Signal::UserState(contribution))
    }

    /// Folds a `user-state`. `solicited` is set when it was addressed to
    /// the local peer, i.e. it answers our own `request-state`.
    pub fn fold(
        &mut self,
        floor: &mut FloorControl,
        from: PeerId,
        state: &UserState,
        solicited: bool,
        now: Instant,
    ) -> Folded {
        if solicited {
            self.replies += 1;
        }
        debug!("Folding state of {}: {:?}", from, state);
        let slot = floor.fold(from, state, now);

        let recording = state.recording && solicited && self.is_pending();
        if recording {
            self.recording_unconfirmed = false;
        } else if state.recording {
            warn!("Ignoring unsolicited recording flag from {}", from);
        }
        Folded { slot, recording }
    }

    /// Marks the round settled once its deadline passed.
    pub fn settle_if_due(&mut self, now: Instant) -> bool {
        match self.status {
            ReconcileStatus::Pending { deadline } if deadline <= now => {
                info!("Session state settled after {} replies", self.replies);
                self.status = ReconcileStatus::Settled;
                true
            }
            _ => false,
        }
    }

    /// Whether the settled round left a pre-drop recording unconfirmed.
    /// Clears the mark.
    pub fn take_unconfirmed_recording(&mut self) -> bool {
        std::mem::take(&mut self.recording_unconfirmed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ReconcileStatus::Pending { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.status {
            ReconcileStatus::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn status(&self) -> ReconcileStatus {
        self.status
    }

    pub fn replies(&self) -> usize {
        self.replies
    }
}
