pub mod bus;
pub mod emitter;

pub use bus::*;
pub use emitter::*;
