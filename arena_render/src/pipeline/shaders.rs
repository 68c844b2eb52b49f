//! Precompiled GPU program blobs
//!
//! Programs are SPIR-V binaries looked up by name through a `ShaderSource`.
//! Every module the backend can use is created once when a session starts
//! and lives until shutdown; pipelines refer to them by name.

use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::device::{GpuDevice, ShaderModuleHandle};
use crate::error::{Error, Result};
use crate::engine_debug;

/// First word of every SPIR-V binary
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Provider of shader blobs
pub trait ShaderSource {
    /// Blob registered under `name`, `None` if there is none
    fn load(&self, name: &str) -> Option<Vec<u8>>;
}

/// Reads `<dir>/<name>.spv`
#[derive(Debug, Clone)]
pub struct DirectoryShaderSource {
    dir: PathBuf,
}

impl DirectoryShaderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ShaderSource for DirectoryShaderSource {
    fn load(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.dir.join(format!("{}.spv", name))).ok()
    }
}

/// Blobs held in memory (embedded programs, tests)
#[derive(Debug, Clone, Default)]
pub struct MemoryShaderSource {
    blobs: FxHashMap<String, Vec<u8>>,
}

impl MemoryShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, blob: Vec<u8>) {
        self.blobs.insert(name.into(), blob);
    }
}

impl ShaderSource for MemoryShaderSource {
    fn load(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.get(name).cloned()
    }
}

/// Check that `blob` looks like a little-endian SPIR-V module
pub fn validate_spirv(name: &str, blob: &[u8]) -> Result<()> {
    if blob.len() < 20 || blob.len() % 4 != 0 {
        return Err(Error::InvalidResource(format!(
            "shader '{}': {} bytes is not a SPIR-V module",
            name,
            blob.len()
        )));
    }
    let magic = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
    if magic != SPIRV_MAGIC {
        return Err(Error::InvalidResource(format!(
            "shader '{}': bad SPIR-V magic {:#010x}",
            name, magic
        )));
    }
    Ok(())
}

/// Names of every program the backend loads
pub const SHADER_MODULES: [&str; 17] = [
    "single_texture.vert",
    "single_texture.frag",
    "multi_texture.vert",
    "multi_texture.frag",
    "color.vert",
    "color.frag",
    "light.vert",
    "light.frag",
    "fog.vert",
    "fog.frag",
    "dot.vert",
    "dot.frag",
    "fullscreen.vert",
    "gamma.frag",
    "bloom_extract.frag",
    "blur.frag",
    "bloom_blend.frag",
];

/// Shader modules of one session
pub struct ShaderLibrary {
    modules: FxHashMap<&'static str, ShaderModuleHandle>,
}

impl ShaderLibrary {
    /// Load and create every module in `SHADER_MODULES`
    pub(crate) fn empty() -> Self {
        Self { modules: FxHashMap::default() }
    }

    pub fn load(device: &mut dyn GpuDevice, source: &dyn ShaderSource) -> Result<Self> {
        let mut library = Self::empty();
        for name in SHADER_MODULES {
            if let Err(err) = library.load_one(device, source, name) {
                library.destroy(device);
                return Err(err);
            }
        }
        engine_debug!("arena::shaders", "Loaded {} shader modules", library.modules.len());
        Ok(library)
    }

    fn load_one(&mut self, device: &mut dyn GpuDevice, source: &dyn ShaderSource, name: &'static str) -> Result<()> {
        let blob = source
            .load(name)
            .ok_or_else(|| Error::InitializationFailed(format!("shader '{}' not found", name)))?;
        validate_spirv(name, &blob)?;
        let module = device.create_shader_module(name, &blob)?;
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ShaderModuleHandle> {
        self.modules
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("unknown shader module '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for (_, module) in self.modules.drain() {
            device.destroy_shader_module(module);
        }
    }
}

/// Smallest valid SPIR-V header (magic, version 1.0, generator, bound, schema)
#[cfg(test)]
pub(crate) fn stub_spirv() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// In-memory source holding a stub blob for every backend program
#[cfg(test)]
pub(crate) fn stub_source() -> MemoryShaderSource {
    let mut source = MemoryShaderSource::new();
    for name in SHADER_MODULES {
        source.insert(name, stub_spirv());
    }
    source
}

#[cfg(test)]
#[path = "shaders_tests.rs"]
mod tests;
