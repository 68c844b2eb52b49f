//! SPIR-V checks run before a shader module is created

use arena_render::arena::{Error, Result};
use arena_render::descriptors::DESCRIPTOR_SLOTS;
use arena_render::engine_bail;
use arena_render::pipeline::shaders::validate_spirv;
use std::io::Cursor;

/// Entry point every backend program uses
pub const ENTRY_POINT: &str = "main";

/// What reflection found in one module
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderInfo {
    /// Highest descriptor set index referenced
    pub max_set: Option<u32>,
    /// Size of the push constant block, if any
    pub push_constant_size: Option<u32>,
}

/// Decode a SPIR-V blob into words after the header checks
pub fn decode_spirv(name: &str, code: &[u8]) -> Result<Vec<u32>> {
    validate_spirv(name, code)?;
    ash::util::read_spv(&mut Cursor::new(code))
        .map_err(|e| Error::InvalidResource(format!("shader '{}': {}", name, e)))
}

/// Reflect a module and check it fits the backend's pipeline layouts
pub fn reflect_shader(name: &str, words: &[u32]) -> Result<ShaderInfo> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| Error::InvalidResource(format!("shader '{}': reflection failed: {:?}", name, e)))?;

    let Some(entry) = entry_points.iter().find(|ep| ep.name == ENTRY_POINT) else {
        engine_bail!("arena::vulkan", "Shader '{}' has no '{}' entry point", name, ENTRY_POINT);
    };

    let mut info = ShaderInfo::default();
    for var in entry.vars.iter() {
        match var {
            spirq::var::Variable::Descriptor { desc_bind, .. } => {
                let set = desc_bind.set();
                if set as usize >= DESCRIPTOR_SLOTS {
                    engine_bail!(
                        "arena::vulkan",
                        "Shader '{}' uses descriptor set {} (at most {} sets)",
                        name,
                        set,
                        DESCRIPTOR_SLOTS
                    );
                }
                if desc_bind.bind() != 0 {
                    engine_bail!(
                        "arena::vulkan",
                        "Shader '{}' uses binding {} in set {} (one binding per set)",
                        name,
                        desc_bind.bind(),
                        set
                    );
                }
                info.max_set = Some(info.max_set.map_or(set, |max| max.max(set)));
            }
            spirq::var::Variable::PushConstant { ty, .. } => {
                info.push_constant_size = ty.nbyte().map(|size| size as u32);
            }
            _ => {}
        }
    }
    Ok(info)
}

#[cfg(test)]
#[path = "reflect_tests.rs"]
mod tests;
