use crate::collab::{ArtifactSink, ChatRecord, Collaborators, MicrophoneControl, PayloadCipher};
use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, Outgoing};
use crate::directory::PeerDirectory;
use crate::error::{SessionError, TransportError};
use crate::floor::{FloorControl, SlotChange};
use crate::reconcile::StateReconciler;
use crate::recording::RecordingCoordinator;
use crate::session::{SessionCommand, SessionEvent, SessionHandle, SessionSnapshot, SessionStatus};
use crate::signaling::{SignalTransport, TransportEvent};
use crate::transport::{LinkEvent, LinkFactory, SdpKind, SessionDescription};
use meshcall_core::{
    ConnectionState, Envelope, JoinRequest, NegotiationRole, PeerId, Sender, SessionCode,
    SessionState, Signal, SignalCodec, Target, Topic, TopicClass, UserState,
};
use std::collections::{BTreeSet, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Who this engine is and which session it joins.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub session_code: SessionCode,
    pub local: Sender,
    pub config: SessionConfig,
}

impl SessionParams {
    pub fn new(session_code: SessionCode, local: Sender) -> Self {
        Self {
            session_code,
            local,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

/// The session event loop.
///
/// Every command, relay frame, link event and timer is handled as one step
/// of [`SessionCoordinator::run`]; steps never interleave, so the
/// directory, the connections and the session-state projection need no
/// locking. Nothing inside a step waits for a remote peer.
pub struct SessionCoordinator {
    local: Sender,
    session_code: SessionCode,
    config: SessionConfig,
    transport: Arc<dyn SignalTransport>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    command_rx: mpsc::Receiver<SessionCommand>,
    link_rx: mpsc::Receiver<LinkEvent>,
    directory: PeerDirectory,
    connections: ConnectionManager,
    floor: FloorControl,
    recording: RecordingCoordinator,
    reconciler: StateReconciler,
    cipher: Arc<dyn PayloadCipher>,
    sink: Arc<dyn ArtifactSink>,
    microphone: Arc<dyn MicrophoneControl>,
    outbox: VecDeque<(Topic, String)>,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: broadcast::Sender<SessionEvent>,
    last_state: SessionState,
    ever_connected: bool,
    resync_pending: bool,
}

impl SessionCoordinator {
    pub fn new(
        params: SessionParams,
        transport: Arc<dyn SignalTransport>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        link_factory: Arc<dyn LinkFactory>,
        collaborators: Collaborators,
    ) -> (Self, SessionHandle) {
        let SessionParams {
            session_code,
            local,
            config,
        } = params;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (link_tx, link_rx) = mpsc::channel(config.link_event_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);

        let connections = ConnectionManager::new(
            local.peer_id,
            link_factory,
            link_tx,
            config.require_local_media,
            config.orphan_candidate_ttl(),
        );
        let floor = FloorControl::new(local.peer_id, config.hand_raise_ttl());
        let recording = RecordingCoordinator::new(
            session_code.clone(),
            local.peer_id,
            collaborators.capture,
            collaborators.sink.clone(),
        );
        let reconciler = StateReconciler::new(config.reconcile_timeout());

        let handle = SessionHandle::new(local.clone(), command_tx, event_tx.clone(), status_rx);

        let coordinator = Self {
            local,
            session_code,
            config,
            transport,
            transport_rx,
            command_rx,
            link_rx,
            directory: PeerDirectory::new(),
            connections,
            floor,
            recording,
            reconciler,
            cipher: collaborators.cipher,
            sink: collaborators.sink,
            microphone: collaborators.microphone,
            outbox: VecDeque::new(),
            status_tx,
            event_tx,
            last_state: SessionState::default(),
            ever_connected: false,
            resync_pending: false,
        };
        (coordinator, handle)
    }

    pub async fn run(mut self) {
        info!(
            "Session loop started for {} in '{}'",
            self.local.peer_id, self.session_code
        );

        loop {
            let wakeup = self.next_wakeup();
            let timer = sleep_until(wakeup.unwrap_or_else(Instant::now));

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => {
                            if self.handle_command(c).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("All session handles dropped. Leaving session.");
                            self.leave().await;
                            break;
                        }
                    }
                }

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            warn!("Transport channel closed unexpectedly");
                            self.leave().await;
                            break;
                        }
                    }
                }

                Some(evt) = self.link_rx.recv() => self.handle_link_event(evt).await,

                _ = timer, if wakeup.is_some() => self.handle_timers().await,
            }

            self.publish_state_if_changed();
        }

        info!("Session loop finished");
    }

    fn next_wakeup(&self) -> Option<Instant> {
        [
            self.floor.next_hand_expiry(),
            self.connections.next_orphan_expiry(),
            self.reconciler.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn handle_timers(&mut self) {
        let now = Instant::now();

        for peer_id in self.floor.expire_hands(now) {
            debug!("Hand of {} timed out", peer_id);
        }
        self.connections.prune_orphans(now);

        if self.reconciler.settle_if_due(now) {
            if self.reconciler.take_unconfirmed_recording() && self.recording.withdraw().await {
                self.emit(SessionEvent::RecordingChanged(false));
            }
            let state = self.session_state();
            self.emit(SessionEvent::Reconciled(state));
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::SetLocalTracks { tracks, reply } => {
                let (out, faults) = self
                    .connections
                    .set_local_tracks(&mut self.directory, tracks)
                    .await;
                self.send_outgoing(out).await;
                for fault in faults {
                    self.handle_link_fault(fault);
                }
                let _ = reply.send(Ok(()));
            }

            SessionCommand::SetMicrophoneEnabled { enabled, reply } => {
                self.microphone.set_enabled(enabled);
                let _ = reply.send(Ok(()));
            }

            SessionCommand::RaiseHand { reply } => {
                self.floor.raise_hand(self.local.peer_id, Instant::now());
                self.broadcast(Signal::RaisedHands).await;
                let _ = reply.send(Ok(()));
            }

            SessionCommand::LowerHand { reply } => {
                if self.floor.lower_hand(&self.local.peer_id) {
                    self.broadcast(Signal::LowerHands).await;
                }
                let _ = reply.send(Ok(()));
            }

            SessionCommand::TakeFloor { reply } => {
                self.floor.grant_floor(self.local.peer_id);
                self.microphone.set_enabled(true);
                self.broadcast(Signal::HasMic).await;
                let _ = reply.send(Ok(()));
            }

            SessionCommand::ReleaseFloor { reply } => {
                self.release_local_floor().await;
                let _ = reply.send(Ok(()));
            }

            SessionCommand::RevokeAllFloors { reply } => {
                let result = self.revoke_all_floors().await;
                let _ = reply.send(result);
            }

            SessionCommand::AcquireScreenShare { reply } => {
                let result = match self.floor.acquire_screen_share() {
                    Ok(true) => {
                        self.broadcast(Signal::ScreenShare { active: true }).await;
                        Ok(())
                    }
                    Ok(false) => Ok(()),
                    Err(e) => {
                        info!("Screen share refused: {}", e);
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }

            SessionCommand::ReleaseScreenShare { reply }
            | SessionCommand::ScreenCaptureEnded { reply } => {
                if self.floor.release_screen_share() {
                    self.broadcast(Signal::ScreenShare { active: false }).await;
                }
                let _ = reply.send(Ok(()));
            }

            SessionCommand::RequestScreen { reply } => {
                let result = match self.floor.screen_sharer() {
                    Some(sharer) if sharer != self.local.peer_id => {
                        self.send(Target::Peer(sharer), Signal::RequestScreen).await;
                        Ok(())
                    }
                    Some(_) => Ok(()),
                    None => Err(SessionError::NoScreenShare),
                };
                let _ = reply.send(result);
            }

            SessionCommand::StartRecording { reply } => {
                let result = self.start_recording().await;
                let _ = reply.send(result);
            }

            SessionCommand::StopRecording { reply } => {
                let result = match self.recording.stop(&self.local).await {
                    Ok(signal) => {
                        self.broadcast(signal).await;
                        self.emit(SessionEvent::RecordingChanged(false));
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SessionCommand::SendChat { body, reply } => {
                let sealed = self.cipher.seal(&body);
                self.broadcast(Signal::Chat { body: sealed }).await;
                self.sink.save_chat(ChatRecord {
                    session_code: self.session_code.clone(),
                    from: self.local.peer_id,
                    sender_name: self.local.profile.name.clone(),
                    body,
                });
                let _ = reply.send(Ok(()));
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            SessionCommand::Leave { reply } => {
                self.leave().await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn revoke_all_floors(&mut self) -> Result<(), SessionError> {
        let held = self.floor.revoke_all_floors(self.local.role)?;
        if held {
            self.microphone.set_enabled(false);
            self.emit(SessionEvent::FloorCleared);
        }
        self.broadcast(Signal::ClearMic).await;
        Ok(())
    }

    async fn start_recording(&mut self) -> Result<(), SessionError> {
        let signals = self.recording.begin(&self.local)?;
        for signal in signals {
            if signal == Signal::ClearMic && self.floor.apply_clear() {
                self.microphone.set_enabled(false);
                self.emit(SessionEvent::FloorCleared);
            }
            self.broadcast(signal).await;
        }
        self.emit(SessionEvent::RecordingChanged(true));
        self.recording.start_capture().await
    }

    async fn release_local_floor(&mut self) {
        if self.floor.release_floor(&self.local.peer_id) {
            self.microphone.set_enabled(false);
            self.broadcast(Signal::EndMic).await;
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected().await,

            TransportEvent::Disconnected => {
                if *self.status_tx.borrow() != SessionStatus::Closed {
                    warn!("Relay connection lost, suspending signaling");
                    self.set_status(SessionStatus::Reconnecting);
                }
            }

            TransportEvent::Frame { topic, frame } => self.handle_frame(topic, frame).await,
        }
    }

    async fn on_connected(&mut self) {
        let reconnect = self.ever_connected;
        self.ever_connected = true;
        self.resync_pending = reconnect;

        let request = JoinRequest {
            session_code: self.session_code.clone(),
            peer_id: self.local.peer_id,
            profile: self.local.profile.clone(),
            role: self.local.role,
        };
        if let Err(e) = self.transport.join(request).await {
            warn!("Join request failed: {}", e);
            return;
        }
        self.set_status(SessionStatus::Connected);
        info!(
            "{} session '{}'",
            if reconnect { "Rejoined" } else { "Joined" },
            self.session_code
        );

        if reconnect {
            // Remote ends dropped their links along with our membership.
            // Reset before any post-rejoin offer can be read.
            for peer_id in self.directory.peer_ids() {
                self.open_link(peer_id, NegotiationRole::Receiver).await;
            }
        }

        let queued = std::mem::take(&mut self.outbox);
        let dropped = queued.iter().filter(|(t, _)| *t == Topic::Relay).count();
        if dropped > 0 {
            debug!("Discarding {} queued negotiation frames", dropped);
        }
        for (topic, frame) in queued.into_iter().filter(|(t, _)| *t != Topic::Relay) {
            self.publish(topic, frame).await;
        }

        if reconnect {
            // Recording is left out: only a president's toggle moves it.
            let own = self.floor.contribution(Instant::now());
            if !own.is_default() {
                self.broadcast(Signal::UserState(own)).await;
            }
        }
    }

    async fn handle_frame(&mut self, topic: Topic, frame: String) {
        let envelope = match SignalCodec::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame on {:?}: {}", topic, e);
                return;
            }
        };

        let own = envelope.from == self.local.peer_id;
        if own && !matches!(topic, Topic::Personal(_)) {
            return;
        }
        if !envelope.is_for(&self.local.peer_id) {
            return;
        }

        debug!(
            "Received {} from {} on {:?}",
            envelope.signal.kind(),
            envelope.from,
            topic
        );
        self.handle_signal(envelope).await;
    }

    async fn handle_signal(&mut self, envelope: Envelope) {
        let Envelope {
            from,
            to,
            sender,
            signal,
        } = envelope;
        let now = Instant::now();

        match signal {
            Signal::Offer { sdp } => {
                if self.directory.upsert(&sender, NegotiationRole::Receiver) {
                    self.emit(SessionEvent::PeerJoined(sender.clone()));
                }
                let description = SessionDescription {
                    kind: SdpKind::Offer,
                    sdp,
                };
                self.negotiate(from, description).await;
            }

            Signal::Answer { sdp } => {
                if !self.directory.contains(&from) {
                    warn!("Dropping answer from unknown peer {}", from);
                    return;
                }
                let description = SessionDescription {
                    kind: SdpKind::Answer,
                    sdp,
                };
                self.negotiate(from, description).await;
            }

            Signal::IceCandidate(candidate) => {
                self.connections
                    .apply_remote_candidate(from, candidate)
                    .await;
            }

            Signal::UserJoined => {
                let fresh = self.directory.upsert(&sender, NegotiationRole::Initiator);
                self.directory
                    .set_negotiation_role(&from, NegotiationRole::Initiator);
                if fresh {
                    self.emit(SessionEvent::PeerJoined(sender));
                }
                self.open_link(from, NegotiationRole::Initiator).await;
            }

            Signal::UserLeft => self.remove_peer(&from).await,

            Signal::MeetingUsers { users } => self.apply_roster(users).await,

            Signal::HasMic => {
                self.floor.grant_floor(from);
            }

            Signal::EndMic => {
                self.floor.release_floor(&from);
            }

            Signal::ClearMic => {
                if !sender.is_president() {
                    warn!("Ignoring clear-mic from non-president {}", from);
                    return;
                }
                if self.floor.apply_clear() {
                    info!("Floor cleared by {}, releasing local microphone", from);
                    self.microphone.set_enabled(false);
                    self.broadcast(Signal::EndMic).await;
                    self.emit(SessionEvent::FloorCleared);
                }
            }

            Signal::RaisedHands => {
                self.floor.raise_hand(from, now);
            }

            Signal::LowerHands => {
                self.floor.lower_hand(&from);
            }

            Signal::ScreenShare { active } => {
                let change = self.floor.observe_screen_share(from, active);
                self.on_slot_change(change);
            }

            Signal::RequestState => {
                if let Some(answer) = self.reconciler.answer_for(self.contribution(now)) {
                    debug!("Answering state request from {}", from);
                    self.send(Target::Peer(from), answer).await;
                }
            }

            Signal::UserState(state) => {
                let solicited = to == Target::Peer(self.local.peer_id);
                let folded = self
                    .reconciler
                    .fold(&mut self.floor, from, &state, solicited, now);
                self.on_slot_change(folded.slot);
                if folded.recording && self.recording.adopt().await {
                    self.emit(SessionEvent::RecordingChanged(true));
                }
            }

            Signal::RequestScreen => {
                if self.floor.screen_sharer() != Some(self.local.peer_id) {
                    debug!("Ignoring screen request from {}: not sharing", from);
                    return;
                }
                match self.connections.renegotiate(&mut self.directory, from).await {
                    Ok(out) => self.send_outgoing(out).await,
                    Err(e) => self.handle_link_fault(e),
                }
            }

            Signal::ToggleRecording { active } => {
                if self.recording.on_remote_toggle(&sender, active).await {
                    self.emit(SessionEvent::RecordingChanged(active));
                }
            }

            Signal::Chat { body } => match self.cipher.open(&body) {
                Ok(body) => {
                    self.sink.save_chat(ChatRecord {
                        session_code: self.session_code.clone(),
                        from,
                        sender_name: sender.profile.name.clone(),
                        body: body.clone(),
                    });
                    self.emit(SessionEvent::Chat { from: sender, body });
                }
                Err(e) => warn!("Dropping chat from {}: {}", from, e),
            },
        }
    }

    /// Rebuilds the peer set from the relay's roster. Links that already
    /// exist are left alone; after a reconnect they were reset when the
    /// relay came back and may have negotiated since.
    async fn apply_roster(&mut self, users: Vec<Sender>) {
        let resync = std::mem::take(&mut self.resync_pending);
        let listed: BTreeSet<PeerId> = users.iter().map(|u| u.peer_id).collect();
        info!("Roster with {} peers (resync: {})", listed.len(), resync);

        for peer_id in self.directory.peer_ids() {
            if !listed.contains(&peer_id) {
                self.remove_peer(&peer_id).await;
            }
        }

        for user in users {
            if user.peer_id == self.local.peer_id {
                continue;
            }
            let fresh = self.directory.upsert(&user, NegotiationRole::Receiver);
            let live = self.connections.handle_of(&user.peer_id).is_some();
            if fresh || !live {
                self.open_link(user.peer_id, NegotiationRole::Receiver).await;
            }
            if fresh {
                self.emit(SessionEvent::PeerJoined(user));
            }
        }

        let now = Instant::now();
        let request = if resync {
            self.reconciler
                .begin_resync(&mut self.floor, self.recording.is_active(), now)
        } else {
            self.reconciler.begin(now)
        };
        self.broadcast(request).await;
    }

    async fn open_link(&mut self, peer_id: PeerId, role: NegotiationRole) {
        match self
            .connections
            .open(&mut self.directory, peer_id, role)
            .await
        {
            Ok((_, out)) => self.send_outgoing(out).await,
            Err(e) => self.handle_link_fault(e),
        }
    }

    async fn negotiate(&mut self, peer_id: PeerId, description: SessionDescription) {
        let before = self.directory.state_of(&peer_id);
        let result = self
            .connections
            .apply_remote_description(&mut self.directory, peer_id, description)
            .await;
        match result {
            Ok(out) => {
                self.note_connected(peer_id, before);
                self.send_outgoing(out).await;
            }
            Err(e) => self.handle_link_fault(e),
        }
    }

    fn note_connected(&self, peer_id: PeerId, before: Option<ConnectionState>) {
        let after = self.directory.state_of(&peer_id);
        let newly = after == Some(ConnectionState::Connected)
            && !matches!(
                before,
                Some(ConnectionState::Connected) | Some(ConnectionState::Renegotiating)
            );
        if newly {
            info!("Link to {} established", peer_id);
            self.emit(SessionEvent::PeerConnected(peer_id));
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        let handle = event.handle();
        if !self.connections.is_current(&handle) {
            debug!("Ignoring event from replaced link to {}", handle.peer_id);
            return;
        }

        match event {
            LinkEvent::CandidateGenerated(_, candidate) => {
                self.send(Target::Peer(handle.peer_id), Signal::IceCandidate(candidate))
                    .await;
            }

            LinkEvent::RemoteTrack(_, track_id) => {
                self.directory.add_track(&handle.peer_id, track_id.clone());
                self.emit(SessionEvent::RemoteTrack {
                    peer_id: handle.peer_id,
                    track_id,
                });
            }

            LinkEvent::Failed(_) => {
                warn!("Link to {} failed, dropping peer", handle.peer_id);
                self.connections
                    .close(&mut self.directory, &handle.peer_id)
                    .await;
                self.directory.remove(&handle.peer_id);
                self.emit(SessionEvent::PeerFailed(handle.peer_id));
            }
        }
    }

    /// Negotiation faults stay scoped to their peer: the link is already
    /// torn down, the peer leaves the directory and nothing is retried.
    fn handle_link_fault(&mut self, error: SessionError) {
        match error {
            SessionError::Link(peer_id, reason) => {
                warn!("Dropping peer {} after link fault: {}", peer_id, reason);
                self.directory.remove(&peer_id);
                self.emit(SessionEvent::PeerFailed(peer_id));
            }
            other => warn!("Negotiation step failed: {}", other),
        }
    }

    async fn remove_peer(&mut self, peer_id: &PeerId) {
        self.connections.close(&mut self.directory, peer_id).await;
        if self.directory.remove(peer_id).is_some() {
            info!("Peer {} left", peer_id);
            self.emit(SessionEvent::PeerLeft(*peer_id));
        }
        self.floor.forget_peer(peer_id);
    }

    fn on_slot_change(&mut self, change: SlotChange) {
        if let SlotChange::LocalDisplaced { winner } = change {
            warn!("Lost screen share slot to {}", winner);
            self.emit(SessionEvent::ScreenShareLost { winner });
        }
    }

    async fn leave(&mut self) {
        if *self.status_tx.borrow() == SessionStatus::Closed {
            return;
        }
        info!("Leaving session '{}'", self.session_code);

        if *self.status_tx.borrow() == SessionStatus::Connected {
            self.broadcast(Signal::UserLeft).await;
        }
        self.recording.finish_capture().await;
        self.connections.close_all(&mut self.directory).await;
        for peer_id in self.directory.peer_ids() {
            self.directory.remove(&peer_id);
        }
        if let Err(e) = self.transport.close().await {
            warn!("Closing transport failed: {}", e);
        }
        self.outbox.clear();
        self.set_status(SessionStatus::Closed);
    }

    fn contribution(&self, now: Instant) -> UserState {
        let mut own = self.floor.contribution(now);
        own.recording = self.recording.is_active();
        own
    }

    fn session_state(&self) -> SessionState {
        SessionState {
            screen_sharer_id: self.floor.screen_sharer(),
            mic_floor_holder_ids: self.floor.floor_holders().clone(),
            raised_hands: self.floor.raised_hands(),
            recording_active: self.recording.is_active(),
        }
    }

    fn publish_state_if_changed(&mut self) {
        let state = self.session_state();
        if state == self.last_state {
            return;
        }
        self.directory.mark_screen_sharer(state.screen_sharer_id);
        self.last_state = state.clone();
        self.emit(SessionEvent::StateChanged(state));
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut peers: Vec<_> = self.directory.peers().cloned().collect();
        peers.sort_by_key(|p| p.peer_id);
        SessionSnapshot {
            local: self.local.clone(),
            status: *self.status_tx.borrow(),
            state: self.session_state(),
            reconcile: self.reconciler.status(),
            peers,
            media_ready: self.connections.is_media_ready(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!("Session status: {:?} -> {:?}", current, status);
            *current = status;
            true
        });
    }

    async fn send_outgoing(&mut self, out: Vec<Outgoing>) {
        for Outgoing { to, signal } in out {
            self.send(Target::Peer(to), signal).await;
        }
    }

    async fn broadcast(&mut self, signal: Signal) {
        self.send(Target::All, signal).await;
    }

    async fn send(&mut self, to: Target, signal: Signal) {
        let topic = match (signal.topic_class(), to) {
            (TopicClass::Relay, _) => Topic::Relay,
            (TopicClass::Personal, Target::Peer(peer_id)) => Topic::Personal(peer_id),
            _ => Topic::Broadcast,
        };
        let envelope = Envelope::new(self.local.clone(), to, signal);
        match SignalCodec::encode(&envelope) {
            Ok(frame) => self.publish(topic, frame).await,
            Err(e) => warn!("Failed to encode {}: {}", envelope.signal.kind(), e),
        }
    }

    /// Publishes now when the relay is up, otherwise queues.
    async fn publish(&mut self, topic: Topic, frame: String) {
        let status = *self.status_tx.borrow();
        match status {
            SessionStatus::Closed => return,
            SessionStatus::Connected => {
                match self.transport.publish(topic, frame.clone()).await {
                    Ok(()) => return,
                    Err(TransportError::NotConnected) => {
                        self.set_status(SessionStatus::Reconnecting);
                    }
                    Err(e) => {
                        warn!("Publish on {:?} failed: {}", topic, e);
                        return;
                    }
                }
            }
            SessionStatus::Connecting | SessionStatus::Reconnecting => {}
        }

        if self.outbox.len() >= self.config.outbox_capacity {
            warn!("Outbox full, dropping oldest frame");
            self.outbox.pop_front();
        }
        self.outbox.push_back((topic, frame));
    }
}
