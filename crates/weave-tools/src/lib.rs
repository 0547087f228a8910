pub mod diff;
pub mod read;
pub mod registry;
pub mod write;

pub use diff::*;
pub use read::*;
pub use registry::*;
pub use write::*;
