//! Device seam: handles, descriptions, the GpuDevice trait and the
//! capability rules used to configure a session

pub mod handles;
pub mod types;
pub mod gpu_device;
pub mod capabilities;
pub mod context;

#[cfg(test)]
pub mod mock_device;

pub use handles::*;
pub use types::*;
pub use gpu_device::*;
pub use capabilities::*;
pub use context::*;
