//! Engine pipelines that exist for the whole session
//!
//! They are registered before the world base and compiled eagerly for the
//! main pass, at startup and after every render-target rebuild.

use crate::device::GpuDevice;
use crate::error::Result;
use crate::pipeline::builder::PipelineContext;
use crate::pipeline::cache::{PipelineCache, PipelineIndex};
use crate::pipeline::state::*;

const CULL_TYPES: [CullType; 3] = [CullType::FrontSided, CullType::BackSided, CullType::TwoSided];

fn cull_index(cull: CullType) -> usize {
    match cull {
        CullType::FrontSided => 0,
        CullType::BackSided => 1,
        CullType::TwoSided => 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinPipelines {
    pub skybox: PipelineIndex,
    /// `[cull][polygon offset]`
    fog: [[PipelineIndex; 2]; 3],
    /// `[cull][polygon offset]`
    dlight: [[PipelineIndex; 2]; 3],
    /// Volume edges drawn with front and back face culling
    pub shadow_edges: [PipelineIndex; 2],
    pub shadow_finish: PipelineIndex,
    /// Triangle outlines, normal and mirrored
    pub wireframe: [PipelineIndex; 2],
    pub normals: PipelineIndex,
    pub debug_color: PipelineIndex,
    pub surface_beam: PipelineIndex,
    pub flare_dot: PipelineIndex,
}

/// Definition of every built-in pipeline, in registration order
pub fn builtin_definitions() -> Vec<PipelineDefinition> {
    let mut defs = Vec::new();

    defs.push(PipelineDefinition {
        shader: ShaderPermutation::SingleTexture { env_map: false, identity_color: true },
        state: StateBits { depth_write: false, ..StateBits::default() },
        cull: CullType::FrontSided,
        ..PipelineDefinition::default()
    });

    let fog_state = StateBits {
        depth_func: DepthFunc::Equal,
        ..StateBits::blended(BlendSrc::SrcAlpha, BlendDst::OneMinusSrcAlpha)
    };
    let dlight_state = StateBits { depth_func: DepthFunc::Equal, ..StateBits::blended(BlendSrc::DstColor, BlendDst::One) };
    for (shader, state) in [
        (ShaderPermutation::Fog, fog_state),
        (ShaderPermutation::Light { line: false }, dlight_state),
    ] {
        for cull in CULL_TYPES {
            for polygon_offset in [false, true] {
                defs.push(PipelineDefinition { shader, state, cull, polygon_offset, ..PipelineDefinition::default() });
            }
        }
    }

    let no_depth_write = StateBits { depth_write: false, ..StateBits::default() };
    for cull in [CullType::FrontSided, CullType::BackSided] {
        defs.push(PipelineDefinition {
            shader: ShaderPermutation::Color,
            state: no_depth_write,
            cull,
            shadow_phase: ShadowPhase::Edges,
            constant_color: true,
            ..PipelineDefinition::default()
        });
    }
    defs.push(PipelineDefinition {
        shader: ShaderPermutation::Color,
        state: StateBits { depth_test: false, ..StateBits::blended(BlendSrc::DstColor, BlendDst::Zero) },
        cull: CullType::TwoSided,
        shadow_phase: ShadowPhase::Finish,
        constant_color: true,
        ..PipelineDefinition::default()
    });

    let wire = StateBits { wireframe: true, depth_test: false, ..StateBits::default() };
    for mirror in [false, true] {
        defs.push(PipelineDefinition {
            shader: ShaderPermutation::Color,
            state: wire,
            cull: CullType::TwoSided,
            mirror,
            constant_color: true,
            ..PipelineDefinition::default()
        });
    }
    defs.push(PipelineDefinition {
        shader: ShaderPermutation::Color,
        cull: CullType::TwoSided,
        topology: Topology::Lines,
        constant_color: true,
        ..PipelineDefinition::default()
    });
    defs.push(PipelineDefinition {
        shader: ShaderPermutation::Color,
        cull: CullType::TwoSided,
        ..PipelineDefinition::default()
    });
    defs.push(PipelineDefinition {
        shader: ShaderPermutation::Color,
        state: StateBits::blended(BlendSrc::One, BlendDst::One),
        cull: CullType::TwoSided,
        constant_color: true,
        ..PipelineDefinition::default()
    });
    defs.push(PipelineDefinition {
        shader: ShaderPermutation::Dot,
        state: no_depth_write,
        cull: CullType::TwoSided,
        topology: Topology::Points,
        ..PipelineDefinition::default()
    });
    defs
}

impl BuiltinPipelines {
    /// Register every built-in definition as persistent and compile it
    pub fn register(
        cache: &mut PipelineCache,
        device: &mut dyn GpuDevice,
        ctx: &PipelineContext<'_>,
    ) -> Result<Self> {
        let mut indices = Vec::new();
        for def in builtin_definitions() {
            indices.push(cache.register_eager(device, ctx, &def)?);
        }
        let mut next = indices.into_iter();
        let mut take = move || next.next().unwrap_or(PipelineIndex(0));

        let skybox = take();
        let mut fog = [[PipelineIndex(0); 2]; 3];
        for row in fog.iter_mut() {
            *row = [take(), take()];
        }
        let mut dlight = [[PipelineIndex(0); 2]; 3];
        for row in dlight.iter_mut() {
            *row = [take(), take()];
        }
        Ok(Self {
            skybox,
            fog,
            dlight,
            shadow_edges: [take(), take()],
            shadow_finish: take(),
            wireframe: [take(), take()],
            normals: take(),
            debug_color: take(),
            surface_beam: take(),
            flare_dot: take(),
        })
    }

    pub fn fog(&self, cull: CullType, polygon_offset: bool) -> PipelineIndex {
        self.fog[cull_index(cull)][polygon_offset as usize]
    }

    pub fn dlight(&self, cull: CullType, polygon_offset: bool) -> PipelineIndex {
        self.dlight[cull_index(cull)][polygon_offset as usize]
    }
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
