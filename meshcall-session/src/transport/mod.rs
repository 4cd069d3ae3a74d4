mod peer_link;
mod track_registry;
mod transport_config;
mod webrtc_link;

pub use peer_link::*;
pub use track_registry::*;
pub use transport_config::*;
pub use webrtc_link::*;
