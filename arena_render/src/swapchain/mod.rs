//! Swapchain, attachments and the render-target epoch built from them

pub mod present;
pub mod attachments;
pub mod render_targets;

pub use present::*;
pub use attachments::*;
pub use render_targets::*;
