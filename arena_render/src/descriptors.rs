//! Descriptor layouts, per-draw binding state and the sampler cache
//!
//! Every draw sees six descriptor sets, one binding each:
//!
//! | set | content                                 |
//! |-----|-----------------------------------------|
//! | 0   | dynamic uniform buffer (entity uniforms) |
//! | 1   | dynamic storage buffer (flare queries)   |
//! | 2-4 | texture bundles 0..2                     |
//! | 5   | fog texture                              |
//!
//! Texture slots left unbound before a draw are filled with the white image.

use rustc_hash::FxHashMap;

use crate::device::*;
use crate::error::{Error, Result};
use crate::engine_trace;

/// Number of descriptor sets per draw
pub const DESCRIPTOR_SLOTS: usize = 6;

/// Sets read by the post-process programs
pub const POST_SAMPLER_SLOTS: usize = 4;

/// Size of the model-view-projection push constant
pub const MVP_PUSH_SIZE: u32 = 64;

/// Set index of a per-draw descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorSlot {
    Uniform = 0,
    Storage = 1,
    Texture0 = 2,
    Texture1 = 3,
    Texture2 = 4,
    Fog = 5,
}

impl DescriptorSlot {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Slot of texture bundle `bundle` (0..=2)
    pub fn texture(bundle: usize) -> DescriptorSlot {
        match bundle {
            0 => DescriptorSlot::Texture0,
            1 => DescriptorSlot::Texture1,
            _ => DescriptorSlot::Texture2,
        }
    }

    fn is_dynamic(index: usize) -> bool {
        index < 2
    }
}

// ============================================================================
// LAYOUTS
// ============================================================================

/// Set layouts and the two pipeline layouts built from them
pub struct DescriptorLayouts {
    pub uniform: DescriptorSetLayoutHandle,
    pub storage: DescriptorSetLayoutHandle,
    pub sampler: DescriptorSetLayoutHandle,
    /// Scene pipelines: six sets plus the MVP push constant
    pub main: PipelineLayoutHandle,
    /// Post-process pipelines: `POST_SAMPLER_SLOTS` sampler sets
    pub post: PipelineLayoutHandle,
}

impl DescriptorLayouts {
    pub(crate) fn empty() -> Self {
        Self {
            uniform: DescriptorSetLayoutHandle::NULL,
            storage: DescriptorSetLayoutHandle::NULL,
            sampler: DescriptorSetLayoutHandle::NULL,
            main: PipelineLayoutHandle::NULL,
            post: PipelineLayoutHandle::NULL,
        }
    }

    pub fn create(device: &mut dyn GpuDevice) -> Result<Self> {
        let mut layouts = Self::empty();
        if let Err(err) = layouts.populate(device) {
            layouts.destroy(device);
            return Err(err);
        }
        Ok(layouts)
    }

    fn populate(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.uniform = device.create_descriptor_set_layout(
            DescriptorKind::UniformDynamic,
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        )?;
        self.storage = device.create_descriptor_set_layout(DescriptorKind::StorageDynamic, ShaderStages::FRAGMENT)?;
        self.sampler = device.create_descriptor_set_layout(DescriptorKind::CombinedImageSampler, ShaderStages::FRAGMENT)?;

        self.main = device.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: vec![self.uniform, self.storage, self.sampler, self.sampler, self.sampler, self.sampler],
            push_constant_size: MVP_PUSH_SIZE,
            push_constant_stages: ShaderStages::VERTEX,
        })?;
        self.post = device.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: vec![self.sampler; POST_SAMPLER_SLOTS],
            push_constant_size: 0,
            push_constant_stages: ShaderStages::empty(),
        })?;
        Ok(())
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for layout in [&mut self.main, &mut self.post] {
            if !layout.is_null() {
                device.destroy_pipeline_layout(*layout);
                *layout = PipelineLayoutHandle::NULL;
            }
        }
        for layout in [&mut self.uniform, &mut self.storage, &mut self.sampler] {
            if !layout.is_null() {
                device.destroy_descriptor_set_layout(*layout);
                *layout = DescriptorSetLayoutHandle::NULL;
            }
        }
    }
}

// ============================================================================
// BINDING STATE
// ============================================================================

/// Descriptor sets wanted by the next draw versus the ones already bound
#[derive(Debug, Clone)]
pub struct DescriptorState {
    current: [DescriptorSetHandle; DESCRIPTOR_SLOTS],
    bound: [DescriptorSetHandle; DESCRIPTOR_SLOTS],
    offsets: [u32; 2],
    bound_offsets: [u32; 2],
    white: DescriptorSetHandle,
}

impl DescriptorState {
    /// `white` fills texture slots nothing was bound to
    pub fn new(white: DescriptorSetHandle) -> Self {
        Self {
            current: [DescriptorSetHandle::NULL; DESCRIPTOR_SLOTS],
            bound: [DescriptorSetHandle::NULL; DESCRIPTOR_SLOTS],
            offsets: [0; 2],
            bound_offsets: [0; 2],
            white,
        }
    }

    /// Forget what the command buffer has bound (new recording)
    pub fn reset(&mut self) {
        self.current = [DescriptorSetHandle::NULL; DESCRIPTOR_SLOTS];
        self.bound = [DescriptorSetHandle::NULL; DESCRIPTOR_SLOTS];
        self.offsets = [0; 2];
        self.bound_offsets = [0; 2];
    }

    /// Forget bindings only; a pipeline layout change invalidates them
    pub fn invalidate(&mut self) {
        self.bound = [DescriptorSetHandle::NULL; DESCRIPTOR_SLOTS];
    }

    pub fn set(&mut self, slot: DescriptorSlot, set: DescriptorSetHandle) {
        self.current[slot.index()] = set;
    }

    pub fn clear(&mut self, slot: DescriptorSlot) {
        self.current[slot.index()] = DescriptorSetHandle::NULL;
    }

    pub fn set_uniform_offset(&mut self, offset: u32) {
        self.offsets[0] = offset;
    }

    pub fn set_storage_offset(&mut self, offset: u32) {
        self.offsets[1] = offset;
    }

    /// What slot `slot` resolves to at the next flush
    pub fn effective(&self, slot: DescriptorSlot) -> DescriptorSetHandle {
        self.resolved(slot.index())
    }

    fn resolved(&self, index: usize) -> DescriptorSetHandle {
        let set = self.current[index];
        if set.is_null() && !DescriptorSlot::is_dynamic(index) {
            self.white
        } else {
            set
        }
    }

    /// Record one bind covering every slot from the first changed one to the
    /// end. Nothing is recorded when all bindings are up to date.
    pub fn flush(&mut self, device: &mut dyn GpuDevice, cmd: CommandBufferHandle, layout: PipelineLayoutHandle) -> Result<()> {
        let resolved: [DescriptorSetHandle; DESCRIPTOR_SLOTS] = std::array::from_fn(|i| self.resolved(i));
        let first = (0..DESCRIPTOR_SLOTS).find(|&i| {
            resolved[i] != self.bound[i] || (DescriptorSlot::is_dynamic(i) && self.offsets[i] != self.bound_offsets[i])
        });
        let Some(first) = first else {
            return Ok(());
        };

        let sets = resolved[first..].to_vec();
        if let Some(missing) = sets.iter().position(|s| s.is_null()) {
            return Err(Error::InvalidResource(format!(
                "descriptor set {} has no binding",
                first + missing
            )));
        }
        let dynamic_offsets: Vec<u32> = (first..2).map(|i| self.offsets[i]).collect();
        engine_trace!("arena::descriptors", "bind sets {}..{}", first, DESCRIPTOR_SLOTS);
        device.record(
            cmd,
            &Command::BindDescriptorSets { layout, first_set: first as u32, sets, dynamic_offsets },
        )?;
        self.bound[first..].copy_from_slice(&resolved[first..]);
        self.bound_offsets = self.offsets;
        Ok(())
    }
}

// ============================================================================
// SAMPLER CACHE
// ============================================================================

/// One device sampler per distinct description
#[derive(Default)]
pub struct SamplerCache {
    samplers: FxHashMap<SamplerDesc, SamplerHandle>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, device: &mut dyn GpuDevice, desc: &SamplerDesc) -> Result<SamplerHandle> {
        if let Some(sampler) = self.samplers.get(desc) {
            return Ok(*sampler);
        }
        let sampler = device.create_sampler(desc)?;
        self.samplers.insert(*desc, sampler);
        Ok(sampler)
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for (_, sampler) in self.samplers.drain() {
            device.destroy_sampler(sampler);
        }
    }
}

#[cfg(test)]
#[path = "descriptors_tests.rs"]
mod tests;
