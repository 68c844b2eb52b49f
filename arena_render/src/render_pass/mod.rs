//! Render pass registry

pub mod registry;

pub use registry::*;
