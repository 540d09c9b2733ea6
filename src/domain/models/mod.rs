mod backend;
mod chat;
mod code_block;
mod credentials;
mod execution;
mod opener;
mod sandbox;

pub use backend::*;
pub use chat::*;
pub use code_block::*;
pub use credentials::*;
pub use execution::*;
pub use opener::*;
pub use sandbox::*;
