pub use meshcall_core::{PeerId, Role, SessionCode, SessionState};

pub mod model {
    pub use meshcall_core::*;
}

#[cfg(feature = "session")]
pub mod session {
    pub use meshcall_session::*;
}
