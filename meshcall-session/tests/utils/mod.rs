pub mod relay_reorder;
pub mod session_helpers;

pub use mock_collab::*;
pub use mock_link::*;
pub use relay_reorder::*;
pub use session_helpers::*;
