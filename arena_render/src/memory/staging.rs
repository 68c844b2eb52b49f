//! Host-visible staging buffer for image uploads and readbacks

use crate::device::{BufferHandle, BufferUsage, GpuDevice};
use crate::error::Result;
use crate::memory::align_up;
use crate::engine_debug;

/// Grows to the largest transfer requested, never shrinks
pub struct StagingBuffer {
    buffer: Option<BufferHandle>,
    size: u64,
}

impl StagingBuffer {
    /// Sizes are rounded up to this granularity
    pub const GRANULARITY: u64 = 64 * 1024;

    pub fn new() -> Self {
        Self { buffer: None, size: 0 }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Buffer with room for at least `size` bytes
    pub fn ensure(&mut self, device: &mut dyn GpuDevice, size: u64) -> Result<BufferHandle> {
        if let Some(buffer) = self.buffer {
            if size <= self.size {
                return Ok(buffer);
            }
            device.destroy_buffer(buffer);
            self.buffer = None;
        }
        let new_size = align_up(size.max(1), Self::GRANULARITY);
        let buffer = device.create_host_buffer(new_size, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST)?;
        engine_debug!("arena::memory", "Staging buffer resized to {} KiB", new_size / 1024);
        self.buffer = Some(buffer);
        self.size = new_size;
        Ok(buffer)
    }

    /// Copy `data` to the start of the staging buffer
    pub fn write(&mut self, device: &mut dyn GpuDevice, data: &[u8]) -> Result<BufferHandle> {
        let buffer = self.ensure(device, data.len() as u64)?;
        device.write_buffer(buffer, 0, data)?;
        Ok(buffer)
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.size = 0;
    }
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
