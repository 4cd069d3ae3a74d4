pub mod codec;
pub mod model;
pub mod utils;

pub use codec::{CodecError, SignalCodec};
pub use model::*;
