use crate::error::TransportError;
use crate::signaling::{SignalTransport, TransportEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use meshcall_core::{
    Envelope, JoinRequest, PeerId, Sender, SessionCode, Signal, SignalCodec, Target, Topic,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

struct Member {
    sender: Sender,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Member {
    fn deliver(&self, topic: Topic, frame: &str) {
        let event = TransportEvent::Frame {
            topic,
            frame: frame.to_owned(),
        };
        if self.tx.send(event).is_err() {
            debug!("Relay: member {} stopped reading", self.sender.peer_id);
        }
    }
}

/// In-process publish/subscribe relay.
///
/// Keeps one member table per session. Publishing holds the session entry
/// while fanning out, which gives every topic a single delivery order.
/// On join the relay answers with the roster on the joiner's personal
/// queue and announces the joiner with `user-joined`; on leave it
/// announces `user-left`.
#[derive(Clone, Default)]
pub struct LocalRelay {
    sessions: Arc<DashMap<SessionCode, Vec<Member>>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client connection to this relay.
    pub fn connect(&self) -> (LocalRelayTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);

        let transport = LocalRelayTransport {
            relay: self.clone(),
            tx,
            connected: AtomicBool::new(true),
            joined: Mutex::new(None),
        };
        (transport, rx)
    }

    /// Grants membership. A repeated join from the same peer id replaces
    /// the previous subscription.
    pub fn attach(&self, request: JoinRequest, tx: mpsc::UnboundedSender<TransportEvent>) {
        let joiner = Sender {
            peer_id: request.peer_id,
            profile: request.profile,
            role: request.role,
        };
        let mut members = self.sessions.entry(request.session_code.clone()).or_default();
        members.retain(|m| m.sender.peer_id != joiner.peer_id);

        let roster: Vec<Sender> = members.iter().map(|m| m.sender.clone()).collect();
        info!(
            "Relay: {} joined session '{}' ({} already present)",
            joiner.peer_id,
            request.session_code,
            roster.len()
        );

        let member = Member {
            sender: joiner.clone(),
            tx,
        };

        let roster_envelope = Envelope::new(
            joiner.clone(),
            Target::Peer(joiner.peer_id),
            Signal::MeetingUsers { users: roster },
        );
        if let Some(frame) = encode(&roster_envelope) {
            member.deliver(Topic::Personal(joiner.peer_id), &frame);
        }

        let joined = Envelope::new(joiner, Target::All, Signal::UserJoined);
        if let Some(frame) = encode(&joined) {
            for other in members.iter() {
                other.deliver(Topic::Broadcast, &frame);
            }
        }

        members.push(member);
    }

    pub fn publish(
        &self,
        session_code: &SessionCode,
        from: &PeerId,
        topic: Topic,
        frame: String,
    ) -> Result<(), TransportError> {
        let Some(members) = self.sessions.get(session_code) else {
            return Err(TransportError::NotJoined);
        };
        if !members.iter().any(|m| &m.sender.peer_id == from) {
            return Err(TransportError::NotJoined);
        }

        match topic {
            Topic::Personal(peer_id) => {
                match members.iter().find(|m| m.sender.peer_id == peer_id) {
                    Some(member) => member.deliver(topic, &frame),
                    None => debug!("Relay: personal frame for absent {}", peer_id),
                }
            }
            Topic::Broadcast | Topic::Relay => {
                for member in members.iter() {
                    member.deliver(topic, &frame);
                }
            }
        }
        Ok(())
    }

    /// Removes a member and tells the others with `user-left`.
    pub fn detach(&self, session_code: &SessionCode, peer_id: &PeerId) -> Option<Sender> {
        self.detach_where(session_code, peer_id, |_| true)
    }

    /// Like [`LocalRelay::detach`], but only if the membership still
    /// delivers to `tx`. A connection that was superseded by a rejoin on
    /// another connection must not evict its successor.
    pub fn detach_subscription(
        &self,
        session_code: &SessionCode,
        peer_id: &PeerId,
        tx: &mpsc::UnboundedSender<TransportEvent>,
    ) -> Option<Sender> {
        self.detach_where(session_code, peer_id, |m| m.tx.same_channel(tx))
    }

    fn detach_where(
        &self,
        session_code: &SessionCode,
        peer_id: &PeerId,
        matches: impl Fn(&Member) -> bool,
    ) -> Option<Sender> {
        let left = {
            let mut members = self.sessions.get_mut(session_code)?;
            let index = members
                .iter()
                .position(|m| &m.sender.peer_id == peer_id && matches(m))?;
            let left = members.remove(index).sender;

            let envelope = Envelope::new(left.clone(), Target::All, Signal::UserLeft);
            if let Some(frame) = encode(&envelope) {
                for member in members.iter() {
                    member.deliver(Topic::Broadcast, &frame);
                }
            }
            left
        };

        info!("Relay: {} left session '{}'", peer_id, session_code);
        self.sessions
            .remove_if(session_code, |_, members| members.is_empty());
        Some(left)
    }

    pub fn members(&self, session_code: &SessionCode) -> Vec<PeerId> {
        self.sessions
            .get(session_code)
            .map(|members| members.iter().map(|m| m.sender.peer_id).collect())
            .unwrap_or_default()
    }
}

fn encode(envelope: &Envelope) -> Option<String> {
    match SignalCodec::encode(envelope) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Relay: failed to encode {}: {}", envelope.signal.kind(), e);
            None
        }
    }
}

/// One client connection to a [`LocalRelay`].
///
/// [`LocalRelayTransport::simulate_disconnect`] and
/// [`LocalRelayTransport::reconnect`] reproduce a dropped relay link: the
/// relay forgets the member (and announces `user-left`) until the client
/// joins again.
pub struct LocalRelayTransport {
    relay: LocalRelay,
    tx: mpsc::UnboundedSender<TransportEvent>,
    connected: AtomicBool,
    joined: Mutex<Option<JoinRequest>>,
}

impl LocalRelayTransport {
    pub async fn simulate_disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(request) = self.joined.lock().await.as_ref() {
            self.relay.detach(&request.session_code, &request.peer_id);
        }
        let _ = self.tx.send(TransportEvent::Disconnected);
    }

    pub fn reconnect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(TransportEvent::Connected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalTransport for LocalRelayTransport {
    async fn join(&self, request: JoinRequest) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.relay.attach(request.clone(), self.tx.clone());
        *self.joined.lock().await = Some(request);
        Ok(())
    }

    async fn publish(&self, topic: Topic, frame: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let joined = self.joined.lock().await;
        let Some(request) = joined.as_ref() else {
            return Err(TransportError::NotJoined);
        };
        self.relay
            .publish(&request.session_code, &request.peer_id, topic, frame)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(request) = self.joined.lock().await.take() {
            self.relay.detach(&request.session_code, &request.peer_id);
        }
        Ok(())
    }
}
