//! Chunked device-local image memory
//!
//! Images are bump-allocated out of fixed-size chunks. A chunk only serves
//! one memory type. When no chunk of the right type has room a new chunk is
//! allocated, up to `max_chunks`. Requests larger than a chunk and pool
//! exhaustion are `CapacityExceeded`: the chunk size was configured too small
//! for the content.

use crate::device::{find_memory_type, GpuDevice, ImageHandle, MemoryHandle, MemoryProperties, MemoryRequirements};
use crate::error::{Error, Result};
use crate::memory::align_up;
use crate::{engine_debug, engine_error};

struct ImageChunk {
    memory: MemoryHandle,
    memory_type: u32,
    used: u64,
}

/// Where an image landed inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAllocation {
    pub memory: MemoryHandle,
    pub offset: u64,
    pub chunk: usize,
}

/// Snapshot of the pool fill level, see `ImageChunkPool::release_to`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkMark {
    used: Vec<u64>,
}

pub struct ImageChunkPool {
    chunk_size: u64,
    max_chunks: usize,
    chunks: Vec<ImageChunk>,
}

impl ImageChunkPool {
    /// Default upper bound on the number of chunks
    pub const MAX_CHUNKS: usize = 64;

    pub fn new(chunk_size: u64, max_chunks: usize) -> Self {
        Self { chunk_size, max_chunks, chunks: Vec::new() }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn used_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.used).sum()
    }

    /// Reserve `requirements` in memory of type `memory_type`
    pub fn allocate(
        &mut self,
        device: &mut dyn GpuDevice,
        requirements: &MemoryRequirements,
        memory_type: u32,
    ) -> Result<ChunkAllocation> {
        if requirements.size > self.chunk_size {
            engine_error!(
                "arena::memory",
                "Image of {} bytes does not fit in a {} byte chunk",
                requirements.size,
                self.chunk_size
            );
            return Err(Error::CapacityExceeded(format!(
                "image of {} bytes exceeds the image chunk size ({} bytes)",
                requirements.size, self.chunk_size
            )));
        }

        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            if chunk.memory_type != memory_type {
                continue;
            }
            let offset = align_up(chunk.used, requirements.alignment);
            if offset + requirements.size <= self.chunk_size {
                chunk.used = offset + requirements.size;
                return Ok(ChunkAllocation { memory: chunk.memory, offset, chunk: index });
            }
        }

        if self.chunks.len() >= self.max_chunks {
            engine_error!("arena::memory", "Image chunk pool exhausted ({} chunks)", self.max_chunks);
            return Err(Error::CapacityExceeded(format!(
                "image chunk pool exhausted ({} chunks of {} bytes)",
                self.max_chunks, self.chunk_size
            )));
        }

        let memory = device.allocate_memory(self.chunk_size, memory_type)?;
        self.chunks.push(ImageChunk { memory, memory_type, used: requirements.size });
        engine_debug!(
            "arena::memory",
            "Allocated image chunk #{} ({} KiB, memory type {})",
            self.chunks.len() - 1,
            self.chunk_size / 1024,
            memory_type
        );
        Ok(ChunkAllocation { memory, offset: 0, chunk: self.chunks.len() - 1 })
    }

    /// Allocate device-local memory for `image` and bind it
    pub fn bind_image(
        &mut self,
        device: &mut dyn GpuDevice,
        image: ImageHandle,
        requirements: &MemoryRequirements,
        properties: MemoryProperties,
    ) -> Result<ChunkAllocation> {
        let memory_type = find_memory_type(
            &device.capabilities().memory_types,
            requirements.memory_type_bits,
            properties,
        )
        .ok_or_else(|| Error::Unsupported(format!("no memory type with {:?}", properties)))?;
        let allocation = self.allocate(device, requirements, memory_type)?;
        device.bind_image_memory(image, allocation.memory, allocation.offset)?;
        Ok(allocation)
    }

    pub fn mark(&self) -> ChunkMark {
        ChunkMark { used: self.chunks.iter().map(|c| c.used).collect() }
    }

    /// Rewind to `mark`: chunks created after it are freed and the fill level
    /// of older chunks is restored. Images placed after the mark must already
    /// be destroyed.
    pub fn release_to(&mut self, device: &mut dyn GpuDevice, mark: &ChunkMark) {
        while self.chunks.len() > mark.used.len() {
            if let Some(chunk) = self.chunks.pop() {
                device.free_memory(chunk.memory);
            }
        }
        for (chunk, used) in self.chunks.iter_mut().zip(&mark.used) {
            chunk.used = *used;
        }
    }

    /// Free every chunk
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for chunk in self.chunks.drain(..) {
            device.free_memory(chunk.memory);
        }
    }
}

#[cfg(test)]
#[path = "image_chunks_tests.rs"]
mod tests;
