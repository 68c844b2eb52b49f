//! Pipeline definitions, construction, caching and the engine's own
//! pipelines

pub mod state;
pub mod shaders;
pub mod builder;
pub mod cache;
pub mod builtin;
pub mod postprocess;

pub use state::*;
pub use shaders::*;
pub use builder::*;
pub use cache::*;
pub use builtin::*;
pub use postprocess::*;
