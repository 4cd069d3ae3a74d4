pub mod collab;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod floor;
pub mod reconcile;
pub mod recording;
pub mod session;
pub mod signaling;
pub mod transport;

pub use collab::*;
pub use config::SessionConfig;
pub use connection::*;
pub use directory::{Peer, PeerDirectory};
pub use error::{SessionError, TransportError};
pub use floor::{FloorControl, SlotChange};
pub use reconcile::{Folded, ReconcileStatus, StateReconciler};
pub use recording::RecordingCoordinator;
pub use session::*;
pub use signaling::*;
pub use transport::*;
