mod coordinator;
mod session_command;
mod session_handle;

pub use coordinator::*;
pub use session_command::*;
pub use session_handle::*;
