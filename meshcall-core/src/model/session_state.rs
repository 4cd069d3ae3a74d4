use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Session-wide shared flags as seen by one participant.
///
/// Every participant holds its own projection; the reconciliation protocol
/// makes them converge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub screen_sharer_id: Option<PeerId>,
    pub mic_floor_holder_ids: BTreeSet<PeerId>,
    pub raised_hands: BTreeSet<PeerId>,
    pub recording_active: bool,
}

impl SessionState {
    pub fn is_default(&self) -> bool {
        *self == SessionState::default()
    }
}
