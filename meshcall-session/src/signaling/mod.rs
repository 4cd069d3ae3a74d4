mod local_relay;
mod signal_transport;
mod ws_handler;
mod ws_transport;

pub use local_relay::*;
pub use signal_transport::*;
pub use ws_handler::*;
pub use ws_transport::*;
