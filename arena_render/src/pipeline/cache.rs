//! Pipeline cache
//!
//! Definitions are registered once and referred to by a stable
//! `PipelineIndex`. Each entry keeps one compiled handle per pipeline pass,
//! filled the first time the definition is used under that pass.
//!
//! Two tiers share the table:
//! - persistent entries registered before `mark_world_base` (built-ins,
//!   compiled eagerly for the main pass at startup and after every rebuild)
//! - world entries registered after it, compiled lazily and dropped in bulk
//!   by `release_world`

use rustc_hash::FxHashMap;

use crate::device::{GpuDevice, PipelineHandle};
use crate::error::{Error, Result};
use crate::pipeline::builder::{describe_pipeline, PipelineContext, PipelinePass};
use crate::pipeline::state::PipelineDefinition;
use crate::{engine_debug, engine_err, engine_error};

/// Upper bound on registered definitions
pub const MAX_PIPELINES: usize = 1024;

/// Stable reference to a cache entry for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineIndex(pub u32);

impl PipelineIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct PipelineEntry {
    definition: PipelineDefinition,
    handles: [PipelineHandle; PipelinePass::COUNT],
    eager: bool,
}

pub struct PipelineCache {
    entries: Vec<PipelineEntry>,
    lookup: FxHashMap<PipelineDefinition, PipelineIndex>,
    capacity: usize,
    world_base: usize,
    compiled: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PIPELINES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            lookup: FxHashMap::default(),
            capacity,
            world_base: 0,
            compiled: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pipelines compiled since the cache was created
    pub fn compiled_count(&self) -> u64 {
        self.compiled
    }

    pub fn world_base(&self) -> usize {
        self.world_base
    }

    pub fn definition(&self, index: PipelineIndex) -> Option<&PipelineDefinition> {
        self.entries.get(index.index()).map(|e| &e.definition)
    }

    /// Compiled handle for `pass`, `None` while not compiled
    pub fn handle(&self, index: PipelineIndex, pass: PipelinePass) -> Option<PipelineHandle> {
        self.entries
            .get(index.index())
            .map(|e| e.handles[pass.index()])
            .filter(|h| !h.is_null())
    }

    /// Index of `definition`, registering it when new. Nothing is compiled.
    pub fn find_or_register(&mut self, definition: &PipelineDefinition) -> Result<PipelineIndex> {
        if let Some(index) = self.lookup.get(definition) {
            return Ok(*index);
        }
        if self.entries.len() >= self.capacity {
            engine_error!("arena::pipeline", "Pipeline table full ({} entries)", self.capacity);
            return Err(Error::CapacityExceeded(format!(
                "pipeline table full ({} entries)",
                self.capacity
            )));
        }
        let index = PipelineIndex(self.entries.len() as u32);
        self.entries.push(PipelineEntry {
            definition: *definition,
            handles: [PipelineHandle::NULL; PipelinePass::COUNT],
            eager: false,
        });
        self.lookup.insert(*definition, index);
        Ok(index)
    }

    /// Register `definition` as persistent and compile it for the main pass
    pub fn register_eager(
        &mut self,
        device: &mut dyn GpuDevice,
        ctx: &PipelineContext<'_>,
        definition: &PipelineDefinition,
    ) -> Result<PipelineIndex> {
        let index = self.find_or_register(definition)?;
        self.entries[index.index()].eager = true;
        self.resolve(device, ctx, index, PipelinePass::Main)?;
        Ok(index)
    }

    /// Compiled pipeline of `index` for `pass`, compiling it on first use
    pub fn resolve(
        &mut self,
        device: &mut dyn GpuDevice,
        ctx: &PipelineContext<'_>,
        index: PipelineIndex,
        pass: PipelinePass,
    ) -> Result<PipelineHandle> {
        let entry = self
            .entries
            .get_mut(index.index())
            .ok_or_else(|| Error::InvalidResource(format!("unknown pipeline index {}", index.0)))?;
        let cached = entry.handles[pass.index()];
        if !cached.is_null() {
            return Ok(cached);
        }

        let desc = describe_pipeline(&entry.definition, pass, ctx)?;
        let handle = device.create_graphics_pipeline(&desc).map_err(|err| {
            engine_err!(
                "arena::pipeline",
                "Failed to compile pipeline {} for {:?}: {}",
                index.0,
                pass,
                err
            )
        })?;
        entry.handles[pass.index()] = handle;
        self.compiled += 1;
        engine_debug!("arena::pipeline", "Compiled pipeline {} for {:?}", index.0, pass);
        Ok(handle)
    }

    /// Compile every persistent entry for the main pass
    pub fn compile_eager(&mut self, device: &mut dyn GpuDevice, ctx: &PipelineContext<'_>) -> Result<()> {
        let eager: Vec<PipelineIndex> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.eager)
            .map(|(i, _)| PipelineIndex(i as u32))
            .collect();
        for index in eager {
            self.resolve(device, ctx, index, PipelinePass::Main)?;
        }
        Ok(())
    }

    /// Entries registered from now on belong to the world tier
    pub fn mark_world_base(&mut self) {
        self.world_base = self.entries.len();
    }

    /// Destroy and forget every world entry. The device must be idle.
    pub fn release_world(&mut self, device: &mut dyn GpuDevice) {
        let base = self.world_base.min(self.entries.len());
        for entry in self.entries.drain(base..) {
            for handle in entry.handles {
                if !handle.is_null() {
                    device.destroy_pipeline(handle);
                }
            }
            self.lookup.remove(&entry.definition);
        }
        engine_debug!("arena::pipeline", "Released world pipelines, {} persistent left", self.entries.len());
    }

    /// Destroy every compiled handle but keep the definitions, so pipelines
    /// recompile against new render passes. The device must be idle.
    pub fn destroy_handles(&mut self, device: &mut dyn GpuDevice) {
        for entry in self.entries.iter_mut() {
            for handle in entry.handles.iter_mut() {
                if !handle.is_null() {
                    device.destroy_pipeline(*handle);
                    *handle = PipelineHandle::NULL;
                }
            }
        }
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.destroy_handles(device);
        self.entries.clear();
        self.lookup.clear();
        self.world_base = 0;
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
