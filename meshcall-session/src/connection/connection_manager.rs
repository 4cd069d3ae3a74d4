use crate::directory::PeerDirectory;
use crate::error::SessionError;
use crate::transport::{
    ConnectionHandle, LinkEvent, LinkFactory, LocalTrack, PeerLink, SdpKind, SessionDescription,
};
use meshcall_core::{ConnectionState, IceCandidate, NegotiationRole, PeerId, Signal};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A relay-topic signal this manager wants delivered to one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: PeerId,
    pub signal: Signal,
}

impl Outgoing {
    fn offer(to: PeerId, sdp: String) -> Self {
        Self {
            to,
            signal: Signal::Offer { sdp },
        }
    }

    fn answer(to: PeerId, sdp: String) -> Self {
        Self {
            to,
            signal: Signal::Answer { sdp },
        }
    }
}

struct Connection {
    handle: ConnectionHandle,
    link: Box<dyn PeerLink>,
    remote_described: bool,
    /// Candidates that arrived before the remote description.
    pending_candidates: Vec<IceCandidate>,
    /// A renegotiation was requested while another exchange was in flight.
    renegotiate_pending: bool,
    /// Initiator waiting for local media before its first offer.
    offer_parked: bool,
}

struct OrphanCandidates {
    first_seen: Instant,
    candidates: Vec<IceCandidate>,
}

/// Drives one negotiation state machine per remote peer.
///
/// The [`PeerDirectory`] owns the peers and their `connection_state`; this
/// manager owns only the links and is handed the directory for every step.
/// Every method runs inside a single session-loop step, so nothing here
/// waits for a remote reply: an exchange that needs one resumes when the
/// reply is delivered as a later message.
pub struct ConnectionManager {
    local_id: PeerId,
    factory: Arc<dyn LinkFactory>,
    link_tx: mpsc::Sender<LinkEvent>,
    connections: HashMap<PeerId, Connection>,
    orphans: HashMap<PeerId, OrphanCandidates>,
    local_tracks: Vec<LocalTrack>,
    media_ready: bool,
    orphan_ttl: Duration,
    next_epoch: u64,
}

impl ConnectionManager {
    pub fn new(
        local_id: PeerId,
        factory: Arc<dyn LinkFactory>,
        link_tx: mpsc::Sender<LinkEvent>,
        require_local_media: bool,
        orphan_ttl: Duration,
    ) -> Self {
        Self {
            local_id,
            factory,
            link_tx,
            connections: HashMap::new(),
            orphans: HashMap::new(),
            local_tracks: Vec::new(),
            media_ready: !require_local_media,
            orphan_ttl,
            next_epoch: 0,
        }
    }

    pub fn is_media_ready(&self) -> bool {
        self.media_ready
    }

    pub fn local_tracks(&self) -> &[LocalTrack] {
        &self.local_tracks
    }

    pub fn handle_of(&self, peer_id: &PeerId) -> Option<ConnectionHandle> {
        self.connections.get(peer_id).map(|c| c.handle)
    }

    /// Whether `handle` still names the live link of its peer.
    pub fn is_current(&self, handle: &ConnectionHandle) -> bool {
        self.handle_of(&handle.peer_id).as_ref() == Some(handle)
    }

    pub fn pending_candidate_count(&self, peer_id: &PeerId) -> usize {
        let buffered = self
            .connections
            .get(peer_id)
            .map_or(0, |c| c.pending_candidates.len());
        let orphaned = self.orphans.get(peer_id).map_or(0, |o| o.candidates.len());
        buffered + orphaned
    }

    /// Opens (or replaces) the link to a peer already in the directory.
    ///
    /// An `Initiator` goes straight to `Offering` and returns its offer,
    /// unless local media has not been declared yet, in which case the offer
    /// is issued by [`ConnectionManager::set_local_tracks`]. A `Receiver`
    /// stays in `New` until the peer's offer arrives.
    pub async fn open(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        role: NegotiationRole,
    ) -> Result<(ConnectionHandle, Vec<Outgoing>), SessionError> {
        if !directory.contains(&peer_id) {
            return Err(SessionError::UnknownPeer(peer_id));
        }

        if let Some(old) = self.connections.remove(&peer_id) {
            debug!("Replacing link to {}", peer_id);
            if let Err(e) = old.link.close().await {
                warn!("Closing replaced link to {} failed: {}", peer_id, e);
            }
        }

        self.next_epoch += 1;
        let handle = ConnectionHandle {
            peer_id,
            epoch: self.next_epoch,
        };

        let link = match self.factory.create(handle, self.link_tx.clone()).await {
            Ok(link) => link,
            Err(e) => {
                directory.transition(&peer_id, ConnectionState::Closed);
                return Err(SessionError::Link(peer_id, e.to_string()));
            }
        };

        directory.reset(&peer_id, role);

        let pending_candidates = self
            .orphans
            .remove(&peer_id)
            .map(|o| o.candidates)
            .unwrap_or_default();
        if !pending_candidates.is_empty() {
            debug!(
                "Adopting {} early candidates for {}",
                pending_candidates.len(),
                peer_id
            );
        }

        self.connections.insert(
            peer_id,
            Connection {
                handle,
                link,
                remote_described: false,
                pending_candidates,
                renegotiate_pending: false,
                offer_parked: false,
            },
        );

        info!("Opened {:?} link to {}", role, peer_id);

        let mut out = Vec::new();
        if role == NegotiationRole::Initiator {
            if self.media_ready {
                out.extend(
                    self.send_offer(directory, peer_id, ConnectionState::Offering)
                        .await?,
                );
            } else if let Some(conn) = self.connections.get_mut(&peer_id) {
                debug!("Parking offer to {} until local media is ready", peer_id);
                conn.offer_parked = true;
            }
        }

        Ok((handle, out))
    }

    /// Applies a remote offer or answer.
    ///
    /// An offer on a link with an offer of ours outstanding is glare: the
    /// higher peer id rolls back and answers, the lower id ignores it.
    pub async fn apply_remote_description(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        description: SessionDescription,
    ) -> Result<Vec<Outgoing>, SessionError> {
        match description.kind {
            SdpKind::Offer => self.accept_offer(directory, peer_id, description).await,
            SdpKind::Answer => self.accept_answer(directory, peer_id, description).await,
        }
    }

    async fn accept_offer(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        offer: SessionDescription,
    ) -> Result<Vec<Outgoing>, SessionError> {
        if !self.connections.contains_key(&peer_id) {
            self.open(directory, peer_id, NegotiationRole::Receiver)
                .await?;
        }

        let Some(state) = directory.state_of(&peer_id) else {
            return Ok(Vec::new());
        };

        if state.is_offering() {
            if self.local_id < peer_id {
                warn!("Offer glare with {}: keeping our own offer", peer_id);
                return Ok(Vec::new());
            }
            info!("Offer glare with {}: rolling back our offer", peer_id);
            let result = self.link(&peer_id)?.rollback().await;
            self.checked(directory, peer_id, result).await?;
            if state == ConnectionState::Offering {
                directory.reset(&peer_id, NegotiationRole::Receiver);
            } else if let Some(conn) = self.connections.get_mut(&peer_id) {
                conn.renegotiate_pending = true;
            }
        }

        match directory.state_of(&peer_id) {
            Some(ConnectionState::New) => {
                directory.transition(&peer_id, ConnectionState::Answering);
            }
            Some(ConnectionState::Connected) => {
                directory.transition(&peer_id, ConnectionState::Renegotiating);
            }
            Some(ConnectionState::Renegotiating) => {}
            other => {
                warn!("Dropping offer from {} in state {:?}", peer_id, other);
                return Ok(Vec::new());
            }
        }

        let result = self.link(&peer_id)?.sync_tracks(&self.local_tracks).await;
        self.checked(directory, peer_id, result).await?;
        let result = self.link(&peer_id)?.set_remote_description(offer).await;
        self.checked(directory, peer_id, result).await?;
        self.mark_described(peer_id).await;

        let result = self.link(&peer_id)?.create_answer().await;
        let sdp = self.checked(directory, peer_id, result).await?;
        directory.transition(&peer_id, ConnectionState::Connected);

        let mut out = vec![Outgoing::answer(peer_id, sdp)];
        out.extend(self.replay_deferred(directory, peer_id).await?);
        Ok(out)
    }

    async fn accept_answer(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        answer: SessionDescription,
    ) -> Result<Vec<Outgoing>, SessionError> {
        let offering = directory
            .state_of(&peer_id)
            .is_some_and(ConnectionState::is_offering);
        if !self.connections.contains_key(&peer_id) || !offering {
            warn!("Dropping stale answer from {}", peer_id);
            return Ok(Vec::new());
        }

        let result = self.link(&peer_id)?.set_remote_description(answer).await;
        self.checked(directory, peer_id, result).await?;
        self.mark_described(peer_id).await;
        directory.transition(&peer_id, ConnectionState::Connected);

        self.replay_deferred(directory, peer_id).await
    }

    /// Adds a remote candidate, buffering it when the link or its remote
    /// description does not exist yet. Candidates are never dropped here;
    /// orphans for unknown peers expire through [`ConnectionManager::prune_orphans`].
    pub async fn apply_remote_candidate(&mut self, peer_id: PeerId, candidate: IceCandidate) {
        let Some(conn) = self.connections.get_mut(&peer_id) else {
            debug!("Buffering candidate for unknown peer {}", peer_id);
            self.orphans
                .entry(peer_id)
                .or_insert_with(|| OrphanCandidates {
                    first_seen: Instant::now(),
                    candidates: Vec::new(),
                })
                .candidates
                .push(candidate);
            return;
        };

        if !conn.remote_described {
            conn.pending_candidates.push(candidate);
            return;
        }

        if let Err(e) = conn.link.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate for {}: {}", peer_id, e);
        }
    }

    /// Re-runs offer/answer on a connected link. Requests that arrive while
    /// the link is mid-exchange are replayed once it reaches `Connected`.
    pub async fn renegotiate(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
    ) -> Result<Vec<Outgoing>, SessionError> {
        if !self.connections.contains_key(&peer_id) {
            return Ok(Vec::new());
        }

        match directory.state_of(&peer_id) {
            Some(ConnectionState::Connected) => {
                self.send_offer(directory, peer_id, ConnectionState::Renegotiating)
                    .await
            }
            Some(ConnectionState::New) => Ok(Vec::new()),
            Some(ConnectionState::Closed) | None => Ok(Vec::new()),
            Some(_) => {
                if let Some(conn) = self.connections.get_mut(&peer_id) {
                    conn.renegotiate_pending = true;
                }
                Ok(Vec::new())
            }
        }
    }

    /// Declares the local tracks. The first call also signals media
    /// readiness and releases parked offers. Only a change of the track set
    /// renegotiates; muting is not a track change.
    pub async fn set_local_tracks(
        &mut self,
        directory: &mut PeerDirectory,
        tracks: Vec<LocalTrack>,
    ) -> (Vec<Outgoing>, Vec<SessionError>) {
        let before: BTreeSet<&str> = self.local_tracks.iter().map(|t| t.id.as_str()).collect();
        let after: BTreeSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        let changed = before != after;
        let became_ready = !self.media_ready;

        self.local_tracks = tracks;
        self.media_ready = true;

        let mut out = Vec::new();
        let mut faults = Vec::new();

        let peers: Vec<PeerId> = self.connections.keys().copied().collect();
        for peer_id in peers {
            let parked = self
                .connections
                .get(&peer_id)
                .is_some_and(|c| c.offer_parked);

            let result = if parked {
                if let Some(conn) = self.connections.get_mut(&peer_id) {
                    conn.offer_parked = false;
                }
                self.send_offer(directory, peer_id, ConnectionState::Offering)
                    .await
            } else if changed {
                self.renegotiate(directory, peer_id).await
            } else {
                Ok(Vec::new())
            };

            match result {
                Ok(signals) => out.extend(signals),
                Err(e) => faults.push(e),
            }
        }

        if became_ready {
            info!("Local media ready ({} tracks)", self.local_tracks.len());
        }

        (out, faults)
    }

    /// Tears down the link to a peer and marks it `Closed`. The caller
    /// removes the peer from the directory afterwards.
    pub async fn close(&mut self, directory: &mut PeerDirectory, peer_id: &PeerId) -> bool {
        self.orphans.remove(peer_id);
        let Some(conn) = self.connections.remove(peer_id) else {
            return false;
        };
        if let Err(e) = conn.link.close().await {
            warn!("Error while closing link to {}: {}", peer_id, e);
        }
        directory.transition(peer_id, ConnectionState::Closed);
        info!("Closed link to {}", peer_id);
        true
    }

    pub async fn close_all(&mut self, directory: &mut PeerDirectory) {
        let peers: Vec<PeerId> = self.connections.keys().copied().collect();
        for peer_id in peers {
            self.close(directory, &peer_id).await;
        }
        self.orphans.clear();
    }

    /// Drops orphaned candidates older than the configured TTL.
    pub fn prune_orphans(&mut self, now: Instant) -> usize {
        let ttl = self.orphan_ttl;
        let before = self.orphans.len();
        self.orphans.retain(|peer_id, orphans| {
            let keep = now.duration_since(orphans.first_seen) < ttl;
            if !keep {
                warn!(
                    "Dropping {} ICE candidates for never-seen peer {}",
                    orphans.candidates.len(),
                    peer_id
                );
            }
            keep
        });
        before - self.orphans.len()
    }

    pub fn next_orphan_expiry(&self) -> Option<Instant> {
        self.orphans
            .values()
            .map(|o| o.first_seen + self.orphan_ttl)
            .min()
    }

    async fn send_offer(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        next: ConnectionState,
    ) -> Result<Vec<Outgoing>, SessionError> {
        if !directory.transition(&peer_id, next) {
            return Ok(Vec::new());
        }
        let result = self.link(&peer_id)?.sync_tracks(&self.local_tracks).await;
        self.checked(directory, peer_id, result).await?;
        let result = self.link(&peer_id)?.create_offer().await;
        let sdp = self.checked(directory, peer_id, result).await?;
        Ok(vec![Outgoing::offer(peer_id, sdp)])
    }

    async fn mark_described(&mut self, peer_id: PeerId) {
        let Some(conn) = self.connections.get_mut(&peer_id) else {
            return;
        };
        conn.remote_described = true;
        for candidate in std::mem::take(&mut conn.pending_candidates) {
            if let Err(e) = conn.link.add_ice_candidate(candidate).await {
                warn!("Failed to add buffered ICE candidate for {}: {}", peer_id, e);
            }
        }
    }

    async fn replay_deferred(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
    ) -> Result<Vec<Outgoing>, SessionError> {
        let pending = self
            .connections
            .get_mut(&peer_id)
            .map(|c| std::mem::take(&mut c.renegotiate_pending))
            .unwrap_or(false);
        if pending {
            debug!("Replaying deferred renegotiation with {}", peer_id);
            return self.renegotiate(directory, peer_id).await;
        }
        Ok(Vec::new())
    }

    fn link(&self, peer_id: &PeerId) -> Result<&dyn PeerLink, SessionError> {
        self.connections
            .get(peer_id)
            .map(|c| c.link.as_ref())
            .ok_or(SessionError::UnknownPeer(*peer_id))
    }

    /// Tears the link down when a link operation failed.
    async fn checked<T>(
        &mut self,
        directory: &mut PeerDirectory,
        peer_id: PeerId,
        result: anyhow::Result<T>,
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Negotiation with {} failed: {}", peer_id, e);
                self.close(directory, &peer_id).await;
                Err(SessionError::Link(peer_id, e.to_string()))
            }
        }
    }
}
