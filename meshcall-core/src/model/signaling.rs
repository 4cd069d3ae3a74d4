use crate::model::peer::{PeerId, Sender};
use crate::utils::BROADCAST_TARGET;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Addressee of an envelope: one peer, or the `"all"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    All,
    Peer(PeerId),
}

impl Target {
    pub fn includes(&self, peer_id: &PeerId) -> bool {
        match self {
            Target::All => true,
            Target::Peer(id) => id == peer_id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str(BROADCAST_TARGET),
            Target::Peer(id) => write!(f, "{}", id),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == BROADCAST_TARGET {
            return Ok(Target::All);
        }
        raw.parse()
            .map(Target::Peer)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// A peer's contribution to a newcomer's view of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(default)]
    pub screen_sharing: bool,
    #[serde(default)]
    pub has_mic: bool,
    /// Milliseconds since the hand went up, if it is up.
    #[serde(default)]
    pub hand_raised_ms: Option<u64>,
    #[serde(default)]
    pub recording: bool,
}

impl UserState {
    pub fn is_default(&self) -> bool {
        *self == UserState::default()
    }
}

/// One variant per wire `kind`, each carrying only what that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Signal {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate(IceCandidate),
    UserJoined,
    UserLeft,
    MeetingUsers { users: Vec<Sender> },
    HasMic,
    EndMic,
    ClearMic,
    RaisedHands,
    LowerHands,
    ScreenShare { active: bool },
    RequestState,
    UserState(UserState),
    RequestScreen,
    ToggleRecording { active: bool },
    Chat { body: String },
}

/// Which relay channel a signal kind travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    Broadcast,
    Relay,
    Personal,
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::IceCandidate(_) => "ice-candidate",
            Signal::UserJoined => "user-joined",
            Signal::UserLeft => "user-left",
            Signal::MeetingUsers { .. } => "meeting-users",
            Signal::HasMic => "has-mic",
            Signal::EndMic => "end-mic",
            Signal::ClearMic => "clear-mic",
            Signal::RaisedHands => "raised-hands",
            Signal::LowerHands => "lower-hands",
            Signal::ScreenShare { .. } => "screen-share",
            Signal::RequestState => "request-state",
            Signal::UserState(_) => "user-state",
            Signal::RequestScreen => "request-screen",
            Signal::ToggleRecording { .. } => "toggle-recording",
            Signal::Chat { .. } => "chat",
        }
    }

    pub fn topic_class(&self) -> TopicClass {
        match self {
            Signal::Offer { .. } | Signal::Answer { .. } | Signal::IceCandidate(_) => {
                TopicClass::Relay
            }
            Signal::MeetingUsers { .. } => TopicClass::Personal,
            _ => TopicClass::Broadcast,
        }
    }
}

/// A signal as it travels on the relay. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: PeerId,
    pub to: Target,
    pub sender: Sender,
    pub signal: Signal,
}

impl Envelope {
    pub fn new(sender: Sender, to: Target, signal: Signal) -> Self {
        Self {
            from: sender.peer_id,
            to,
            sender,
            signal,
        }
    }

    pub fn is_for(&self, peer_id: &PeerId) -> bool {
        self.to.includes(peer_id)
    }
}
