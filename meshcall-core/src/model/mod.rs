mod connection;
mod peer;
mod relay;
mod session;
mod session_state;
mod signaling;

pub use connection::{ConnectionState, NegotiationRole};
pub use peer::{PeerId, Profile, Role, Sender};
pub use relay::{ClientFrame, ServerFrame};
pub use session::{JoinRequest, SessionCode, Topic};
pub use session_state::SessionState;
pub use signaling::{
    Envelope, IceCandidate, IceServerConfig, Signal, Target, TopicClass, UserState,
};
