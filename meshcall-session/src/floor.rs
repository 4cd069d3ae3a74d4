use crate::error::SessionError;
use meshcall_core::{PeerId, Role, UserState};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of feeding a screen-share claim into the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    Unchanged,
    Updated,
    /// The local peer held the slot and lost it to a lower peer id.
    LocalDisplaced { winner: PeerId },
}

/// Owner of the exclusive session resources: microphone floor, raised-hand
/// queue and screen-share slot, as projected by the local peer.
///
/// Competing screen-share claims resolve to the lowest [`PeerId`], so every
/// projection that has seen the same claims holds the same sharer no
/// matter in which order they arrived.
#[derive(Debug)]
pub struct FloorControl {
    local: PeerId,
    hand_ttl: Duration,
    screen_sharer: Option<PeerId>,
    floor_holders: BTreeSet<PeerId>,
    /// Expiry deadline per raised hand.
    raised_hands: HashMap<PeerId, Instant>,
}

impl FloorControl {
    pub fn new(local: PeerId, hand_ttl: Duration) -> Self {
        Self {
            local,
            hand_ttl,
            screen_sharer: None,
            floor_holders: BTreeSet::new(),
            raised_hands: HashMap::new(),
        }
    }

    pub fn raise_hand(&mut self, peer_id: PeerId, now: Instant) -> bool {
        self.raise_hand_aged(peer_id, now, Duration::ZERO)
    }

    /// Records a hand that was raised `age` ago somewhere else, keeping the
    /// original expiry. Returns `false` if it has already expired.
    pub fn raise_hand_aged(&mut self, peer_id: PeerId, now: Instant, age: Duration) -> bool {
        let Some(remaining) = self.hand_ttl.checked_sub(age).filter(|r| !r.is_zero()) else {
            debug!("Ignoring stale raised hand of {}", peer_id);
            return false;
        };
        let fresh = self.raised_hands.insert(peer_id, now + remaining).is_none();
        if fresh {
            debug!("Hand raised by {}", peer_id);
        }
        true
    }

    pub fn lower_hand(&mut self, peer_id: &PeerId) -> bool {
        self.raised_hands.remove(peer_id).is_some()
    }

    pub fn grant_floor(&mut self, peer_id: PeerId) -> bool {
        self.floor_holders.insert(peer_id)
    }

    pub fn release_floor(&mut self, peer_id: &PeerId) -> bool {
        self.floor_holders.remove(peer_id)
    }

    /// Local half of the clear directive: only a president may issue it.
    pub fn revoke_all_floors(&mut self, issuer_role: Role) -> Result<bool, SessionError> {
        if issuer_role != Role::President {
            return Err(SessionError::NotPermitted("revoke all floors"));
        }
        Ok(self.apply_clear())
    }

    /// Empties the floor set. Returns whether the local peer was holding
    /// the floor, in which case the caller must release it locally.
    pub fn apply_clear(&mut self) -> bool {
        let held = self.floor_holders.contains(&self.local);
        if !self.floor_holders.is_empty() {
            info!("Clearing {} floor holders", self.floor_holders.len());
        }
        self.floor_holders.clear();
        held
    }

    /// Claims the slot for the local peer. `Ok(false)` means it was
    /// already ours.
    pub fn acquire_screen_share(&mut self) -> Result<bool, SessionError> {
        match self.screen_sharer {
            Some(holder) if holder == self.local => Ok(false),
            Some(holder) => Err(SessionError::ScreenShareHeld(holder)),
            None => {
                self.screen_sharer = Some(self.local);
                info!("Screen share acquired locally");
                Ok(true)
            }
        }
    }

    pub fn release_screen_share(&mut self) -> bool {
        if self.screen_sharer == Some(self.local) {
            self.screen_sharer = None;
            info!("Screen share released locally");
            return true;
        }
        false
    }

    /// Applies a `screen-share` claim or release observed from `peer_id`.
    pub fn observe_screen_share(&mut self, peer_id: PeerId, active: bool) -> SlotChange {
        if !active {
            if self.screen_sharer == Some(peer_id) {
                self.screen_sharer = None;
                return SlotChange::Updated;
            }
            return SlotChange::Unchanged;
        }

        match self.screen_sharer {
            None => {
                self.screen_sharer = Some(peer_id);
                SlotChange::Updated
            }
            Some(holder) if holder == peer_id => SlotChange::Unchanged,
            Some(holder) if peer_id < holder => {
                info!("Screen share contested: {} wins over {}", peer_id, holder);
                self.screen_sharer = Some(peer_id);
                if holder == self.local {
                    SlotChange::LocalDisplaced { winner: peer_id }
                } else {
                    SlotChange::Updated
                }
            }
            Some(holder) => {
                debug!("Screen share contested: {} keeps slot over {}", holder, peer_id);
                SlotChange::Unchanged
            }
        }
    }

    /// Folds one peer's `user-state` reply into the projection.
    pub fn fold(&mut self, peer_id: PeerId, state: &UserState, now: Instant) -> SlotChange {
        if state.has_mic {
            self.grant_floor(peer_id);
        }
        if let Some(age_ms) = state.hand_raised_ms {
            self.raise_hand_aged(peer_id, now, Duration::from_millis(age_ms));
        }
        if state.screen_sharing {
            return self.observe_screen_share(peer_id, true);
        }
        SlotChange::Unchanged
    }

    /// Removes hands whose deadline has passed.
    pub fn expire_hands(&mut self, now: Instant) -> Vec<PeerId> {
        let expired: Vec<PeerId> = self
            .raised_hands
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(peer_id, _)| *peer_id)
            .collect();
        for peer_id in &expired {
            debug!("Raised hand of {} expired", peer_id);
            self.raised_hands.remove(peer_id);
        }
        expired
    }

    pub fn next_hand_expiry(&self) -> Option<Instant> {
        self.raised_hands.values().min().copied()
    }

    /// Drops every flag held by a peer that left. Returns whether anything
    /// changed.
    pub fn forget_peer(&mut self, peer_id: &PeerId) -> bool {
        let mut changed = self.floor_holders.remove(peer_id);
        changed |= self.raised_hands.remove(peer_id).is_some();
        if self.screen_sharer == Some(*peer_id) {
            self.screen_sharer = None;
            changed = true;
        }
        changed
    }

    /// Forgets every flag held by other peers. Used before a resync round
    /// rebuilds them from `user-state` replies; the local flags stay.
    pub fn reset_remote(&mut self) {
        let local = self.local;
        if self.screen_sharer.is_some_and(|sharer| sharer != local) {
            self.screen_sharer = None;
        }
        self.floor_holders.retain(|peer_id| *peer_id == local);
        self.raised_hands.retain(|peer_id, _| *peer_id == local);
        debug!("Remote session flags reset");
    }

    /// The local peer's own flags, as sent in a `user-state` reply.
    /// `recording` is left for the recording owner to fill in.
    pub fn contribution(&self, now: Instant) -> UserState {
        let hand_raised_ms = self.raised_hands.get(&self.local).map(|deadline| {
            let remaining = deadline.saturating_duration_since(now);
            self.hand_ttl.saturating_sub(remaining).as_millis() as u64
        });

        UserState {
            screen_sharing: self.screen_sharer == Some(self.local),
            has_mic: self.floor_holders.contains(&self.local),
            hand_raised_ms,
            recording: false,
        }
    }

    pub fn screen_sharer(&self) -> Option<PeerId> {
        self.screen_sharer
    }

    pub fn floor_holders(&self) -> &BTreeSet<PeerId> {
        &self.floor_holders
    }

    pub fn raised_hands(&self) -> BTreeSet<PeerId> {
        self.raised_hands.keys().copied().collect()
    }

    pub fn holds_floor(&self, peer_id: &PeerId) -> bool {
        self.floor_holders.contains(peer_id)
    }

    pub fn hand_raised(&self, peer_id: &PeerId) -> bool {
        self.raised_hands.contains_key(peer_id)
    }
}
