//! Per-frame-slot geometry buffer
//!
//! Each frame slot owns one host-visible region. Vertex, index and uniform
//! data for a frame is appended at an aligned cursor. A push that does not
//! fit marks the frame as overflowed: it and every later push of the frame
//! are dropped, and a resize to at least double the capacity is queued. The
//! frame scheduler applies the resize after the frame is presented, before
//! the next frame begins.

use crate::device::{
    BufferHandle, BufferUsage, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
    GpuDevice, GEOMETRY_ALIGNMENT,
};
use crate::error::Result;
use crate::memory::align_up;
use crate::{engine_info, engine_warn};

/// What a push contains; decides its alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Vertex,
    Index,
    Uniform,
}

/// One slot's region plus the uniform descriptor set bound to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRegion {
    pub buffer: BufferHandle,
    pub uniform_set: DescriptorSetHandle,
}

/// Fixed parameters of a geometry buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryBufferDesc {
    pub slot_count: usize,
    pub capacity: u64,
    pub uniform_alignment: u64,
    /// Bytes visible through the uniform descriptor at each dynamic offset
    pub uniform_range: u64,
    pub descriptor_pool: DescriptorPoolHandle,
    pub uniform_layout: DescriptorSetLayoutHandle,
}

pub struct GeometryBuffer {
    desc: GeometryBufferDesc,
    regions: Vec<GeometryRegion>,
    capacity: u64,
    slot: usize,
    cursor: u64,
    /// Bytes the current frame asked for, including dropped pushes
    demand: u64,
    overflowed: bool,
    resize_request: Option<u64>,
}

impl GeometryBuffer {
    pub fn new(device: &mut dyn GpuDevice, desc: GeometryBufferDesc) -> Result<Self> {
        let capacity = desc.capacity.max(desc.uniform_range);
        let mut geometry = Self {
            desc,
            regions: Vec::with_capacity(desc.slot_count),
            capacity,
            slot: 0,
            cursor: 0,
            demand: 0,
            overflowed: false,
            resize_request: None,
        };
        for _ in 0..desc.slot_count {
            let uniform_set = device.allocate_descriptor_set(desc.descriptor_pool, desc.uniform_layout)?;
            let buffer = geometry.create_region_buffer(device, uniform_set)?;
            geometry.regions.push(GeometryRegion { buffer, uniform_set });
        }
        Ok(geometry)
    }

    /// Buffer with no regions, owning nothing
    pub(crate) fn empty() -> Self {
        Self {
            desc: GeometryBufferDesc::default(),
            regions: Vec::new(),
            capacity: 0,
            slot: 0,
            cursor: 0,
            demand: 0,
            overflowed: false,
            resize_request: None,
        }
    }

    fn create_region_buffer(
        &self,
        device: &mut dyn GpuDevice,
        uniform_set: DescriptorSetHandle,
    ) -> Result<BufferHandle> {
        let buffer = device.create_host_buffer(
            self.capacity,
            BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::UNIFORM,
        )?;
        device.write_buffer_descriptor(uniform_set, buffer, self.desc.uniform_range)?;
        Ok(buffer)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn pending_resize(&self) -> Option<u64> {
        self.resize_request
    }

    pub fn region(&self, slot: usize) -> GeometryRegion {
        self.regions[slot]
    }

    pub fn current(&self) -> GeometryRegion {
        self.regions[self.slot]
    }

    /// Start writing into `slot`'s region from the beginning
    pub fn begin_slot(&mut self, slot: usize) {
        self.slot = slot;
        self.cursor = 0;
        self.demand = 0;
        self.overflowed = false;
    }

    /// Append `data`; `None` means it did not fit and was dropped
    pub fn push(&mut self, device: &mut dyn GpuDevice, kind: GeometryKind, data: &[u8]) -> Result<Option<u64>> {
        let alignment = match kind {
            GeometryKind::Uniform => self.desc.uniform_alignment.max(GEOMETRY_ALIGNMENT),
            GeometryKind::Vertex | GeometryKind::Index => GEOMETRY_ALIGNMENT,
        };
        let size = data.len() as u64;
        // a uniform offset exposes the whole descriptor range to the shader
        let reserved = match kind {
            GeometryKind::Uniform => size.max(self.desc.uniform_range),
            GeometryKind::Vertex | GeometryKind::Index => size,
        };
        self.demand = align_up(self.demand, alignment) + reserved;

        if self.overflowed {
            self.request_resize(self.demand);
            return Ok(None);
        }

        let offset = align_up(self.cursor, alignment);
        if offset + reserved > self.capacity {
            self.overflowed = true;
            self.request_resize(self.demand);
            engine_warn!(
                "arena::geometry",
                "Geometry buffer overflow ({} + {} > {} bytes), skipping draws until the next frame",
                offset,
                reserved,
                self.capacity
            );
            return Ok(None);
        }

        device.write_buffer(self.regions[self.slot].buffer, offset, data)?;
        self.cursor = offset + size;
        Ok(Some(offset))
    }

    fn request_resize(&mut self, demand: u64) {
        let wanted = (self.capacity * 2).max(demand.next_power_of_two());
        self.resize_request = Some(self.resize_request.map_or(wanted, |r| r.max(wanted)));
    }

    /// Apply a queued resize: every slot's buffer is recreated at the new
    /// size and its uniform descriptor rewritten. The device must be idle.
    /// Returns whether a resize happened.
    pub fn apply_resize(&mut self, device: &mut dyn GpuDevice) -> Result<bool> {
        let Some(new_capacity) = self.resize_request.take() else {
            return Ok(false);
        };
        for region in &mut self.regions {
            if !region.buffer.is_null() {
                device.destroy_buffer(region.buffer);
                region.buffer = BufferHandle::NULL;
            }
        }
        engine_info!(
            "arena::geometry",
            "Resizing geometry buffers {} -> {} bytes",
            self.capacity,
            new_capacity
        );
        self.capacity = new_capacity;
        for index in 0..self.regions.len() {
            let uniform_set = self.regions[index].uniform_set;
            let buffer = self.create_region_buffer(device, uniform_set)?;
            self.regions[index].buffer = buffer;
        }
        self.cursor = 0;
        self.demand = 0;
        self.overflowed = false;
        Ok(true)
    }

    /// Destroy the buffers; descriptor sets go away with their pool
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for region in self.regions.drain(..) {
            if !region.buffer.is_null() {
                device.destroy_buffer(region.buffer);
            }
        }
    }
}

#[cfg(test)]
#[path = "geometry_buffer_tests.rs"]
mod tests;
