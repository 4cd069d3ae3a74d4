use meshcall_core::{ConnectionState, NegotiationRole, PeerId, Profile, Role, Sender};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// A remote participant as known to this engine.
#[derive(Debug, Clone)]
pub struct Peer {
    pub peer_id: PeerId,
    pub profile: Profile,
    pub role: Role,
    pub connection_state: ConnectionState,
    pub negotiation_role: NegotiationRole,
    pub media_track_ids: BTreeSet<String>,
    pub is_screen_sharer: bool,
}

/// Owner of every [`Peer`]. Entries are keyed by attendance id, so a
/// rejoining human is a new entry, never a merged one.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, Peer>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sender` if unknown, refreshing the profile otherwise.
    /// Returns `true` when a new entry was created.
    pub fn upsert(&mut self, sender: &Sender, negotiation_role: NegotiationRole) -> bool {
        if let Some(peer) = self.peers.get_mut(&sender.peer_id) {
            peer.profile = sender.profile.clone();
            peer.role = sender.role;
            return false;
        }

        debug!("Directory: adding peer {} ({})", sender.peer_id, sender.profile.name);
        self.peers.insert(
            sender.peer_id,
            Peer {
                peer_id: sender.peer_id,
                profile: sender.profile.clone(),
                role: sender.role,
                connection_state: ConnectionState::New,
                negotiation_role,
                media_track_ids: BTreeSet::new(),
                is_screen_sharer: false,
            },
        );
        true
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Peer> {
        let removed = self.peers.remove(peer_id);
        if removed.is_some() {
            debug!("Directory: removed peer {}", peer_id);
        }
        removed
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.get(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn state_of(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.peers.get(peer_id).map(|p| p.connection_state)
    }

    /// Applies a state-machine step. Illegal steps are refused and logged.
    pub fn transition(&mut self, peer_id: &PeerId, next: ConnectionState) -> bool {
        let Some(peer) = self.peers.get_mut(peer_id) else {
            return false;
        };
        if !peer.connection_state.can_transition_to(next) {
            warn!(
                "Directory: refusing {:?} -> {:?} for {}",
                peer.connection_state, next, peer_id
            );
            return false;
        }
        debug!("Peer {}: {:?} -> {:?}", peer_id, peer.connection_state, next);
        peer.connection_state = next;
        true
    }

    /// Puts a peer back to `New` for a fresh link, e.g. after a rejoin.
    pub fn reset(&mut self, peer_id: &PeerId, negotiation_role: NegotiationRole) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connection_state = ConnectionState::New;
            peer.negotiation_role = negotiation_role;
            peer.media_track_ids.clear();
        }
    }

    pub fn set_negotiation_role(&mut self, peer_id: &PeerId, role: NegotiationRole) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.negotiation_role = role;
        }
    }

    pub fn add_track(&mut self, peer_id: &PeerId, track_id: String) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.media_track_ids.insert(track_id);
        }
    }

    /// Mirrors the screen-share slot onto the per-peer flags.
    pub fn mark_screen_sharer(&mut self, sharer: Option<PeerId>) {
        for peer in self.peers.values_mut() {
            peer.is_screen_sharer = Some(peer.peer_id) == sharer;
        }
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
