pub mod annotator;
pub mod artifacts;
pub mod pipeline;

pub use artifacts::*;
pub use pipeline::*;
