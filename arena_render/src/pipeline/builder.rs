//! Pipeline construction
//!
//! `describe_pipeline` derives the full device pipeline description from a
//! `PipelineDefinition` and the render pass it will be used in. It is a pure
//! function: the same inputs always give the same description.

use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::shaders::ShaderLibrary;
use crate::pipeline::state::*;

/// Render passes scene pipelines are compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePass {
    Main,
    ScreenMap,
    /// 2D drawn after the bloom composite
    PostBloom,
}

impl PipelinePass {
    pub const COUNT: usize = 3;

    pub const ALL: [PipelinePass; Self::COUNT] = [PipelinePass::Main, PipelinePass::ScreenMap, PipelinePass::PostBloom];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Render pass a pipeline targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTarget {
    pub render_pass: RenderPassHandle,
    pub samples: SampleCount,
    pub has_depth: bool,
}

/// Everything besides the definition that pipeline construction reads
pub struct PipelineContext<'a> {
    pub shaders: &'a ShaderLibrary,
    pub layout: PipelineLayoutHandle,
    /// Indexed by `PipelinePass::index`; `None` when the pass does not exist
    pub targets: [Option<PassTarget>; PipelinePass::COUNT],
    pub wide_lines: bool,
    pub depth_clamp: bool,
    /// The depth attachment has a stencil aspect
    pub stencil: bool,
}

// ===== SPECIALIZATION CONSTANT IDS =====

pub const SPEC_ALPHA_TEST: u32 = 0;
pub const SPEC_FOG: u32 = 1;
pub const SPEC_ABS_LIGHT: u32 = 2;
pub const SPEC_ENV_MAP: u32 = 3;
pub const SPEC_IDENTITY_COLOR: u32 = 4;
pub const SPEC_CONSTANT_COLOR: u32 = 5;
pub const SPEC_TEXTURE_ENV: u32 = 6;
pub const SPEC_TEXTURE_COUNT: u32 = 7;

// ===== VERTEX STREAMS =====

/// Vertex streams, one binding each; the attribute location equals the
/// binding number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStream {
    Position = 0,
    Color0 = 1,
    TexCoord0 = 2,
    TexCoord1 = 3,
    TexCoord2 = 4,
    Normal = 5,
    Color1 = 6,
    Color2 = 7,
}

impl VertexStream {
    pub const COUNT: usize = 8;

    pub fn binding(self) -> u32 {
        self as u32
    }

    pub fn format(self) -> VertexFormat {
        match self {
            VertexStream::Position | VertexStream::Normal => VertexFormat::Float4,
            VertexStream::Color0 | VertexStream::Color1 | VertexStream::Color2 => VertexFormat::UByte4Norm,
            VertexStream::TexCoord0 | VertexStream::TexCoord1 | VertexStream::TexCoord2 => VertexFormat::Float2,
        }
    }
}

/// Streams the vertex program of `def` reads, in binding order
pub fn vertex_streams(def: &PipelineDefinition) -> Vec<VertexStream> {
    use VertexStream::*;
    let color = !def.constant_color;
    let mut streams = vec![Position];
    match def.shader {
        ShaderPermutation::SingleTexture { env_map, identity_color } => {
            if color && !identity_color {
                streams.push(Color0);
            }
            if !env_map {
                streams.push(TexCoord0);
            } else {
                streams.push(Normal);
            }
        }
        ShaderPermutation::MultiTextureMul2 | ShaderPermutation::MultiTextureAdd2 => {
            if color {
                streams.push(Color0);
            }
            streams.extend([TexCoord0, TexCoord1]);
        }
        ShaderPermutation::MultiTextureBlend2 => {
            if color {
                streams.push(Color0);
            }
            streams.extend([TexCoord0, TexCoord1]);
            if color {
                streams.push(Color1);
            }
        }
        ShaderPermutation::MultiTextureMul3 | ShaderPermutation::MultiTextureAdd3 => {
            if color {
                streams.push(Color0);
            }
            streams.extend([TexCoord0, TexCoord1, TexCoord2]);
            if color {
                streams.extend([Color1, Color2]);
            }
        }
        ShaderPermutation::Color => {
            if color {
                streams.push(Color0);
            }
        }
        ShaderPermutation::Light { .. } => streams.extend([TexCoord0, Normal]),
        ShaderPermutation::Fog => streams.push(TexCoord0),
        ShaderPermutation::Dot => {}
    }
    streams
}

fn program_names(shader: ShaderPermutation) -> (&'static str, &'static str) {
    match shader {
        ShaderPermutation::SingleTexture { .. } => ("single_texture.vert", "single_texture.frag"),
        ShaderPermutation::MultiTextureMul2
        | ShaderPermutation::MultiTextureAdd2
        | ShaderPermutation::MultiTextureMul3
        | ShaderPermutation::MultiTextureAdd3
        | ShaderPermutation::MultiTextureBlend2 => ("multi_texture.vert", "multi_texture.frag"),
        ShaderPermutation::Color => ("color.vert", "color.frag"),
        ShaderPermutation::Light { .. } => ("light.vert", "light.frag"),
        ShaderPermutation::Fog => ("fog.vert", "fog.frag"),
        ShaderPermutation::Dot => ("dot.vert", "dot.frag"),
    }
}

fn texture_env(shader: ShaderPermutation) -> u32 {
    match shader {
        ShaderPermutation::MultiTextureAdd2 | ShaderPermutation::MultiTextureAdd3 => 1,
        ShaderPermutation::MultiTextureBlend2 => 2,
        _ => 0,
    }
}

fn cull_mode(cull: CullType, mirror: bool) -> CullMode {
    match (cull, mirror) {
        (CullType::TwoSided, _) => CullMode::None,
        (CullType::FrontSided, false) | (CullType::BackSided, true) => CullMode::Back,
        (CullType::FrontSided, true) | (CullType::BackSided, false) => CullMode::Front,
    }
}

fn shadow_stencil(phase: ShadowPhase) -> Option<(StencilFaceState, StencilFaceState)> {
    match phase {
        ShadowPhase::None => None,
        ShadowPhase::Edges => Some((
            StencilFaceState { pass_op: StencilOp::IncrementAndWrap, ..StencilFaceState::default() },
            StencilFaceState { pass_op: StencilOp::DecrementAndWrap, ..StencilFaceState::default() },
        )),
        ShadowPhase::Finish => {
            let face = StencilFaceState { compare_op: CompareOp::NotEqual, ..StencilFaceState::default() };
            Some((face, face))
        }
    }
}

/// Device description of `def` compiled for `pass`
pub fn describe_pipeline(
    def: &PipelineDefinition,
    pass: PipelinePass,
    ctx: &PipelineContext<'_>,
) -> Result<GraphicsPipelineDesc> {
    let target = ctx.targets[pass.index()]
        .ok_or_else(|| Error::InvalidResource(format!("no render pass for {:?} pipelines", pass)))?;

    let (vertex_name, fragment_name) = program_names(def.shader);
    let vertex_module = ctx.shaders.get(vertex_name)?;
    let fragment_module = ctx.shaders.get(fragment_name)?;

    let streams = vertex_streams(def);
    let bindings = streams
        .iter()
        .map(|s| VertexBinding { binding: s.binding(), stride: s.format().size_bytes() })
        .collect();
    let attributes = streams
        .iter()
        .map(|s| VertexAttribute { location: s.binding(), binding: s.binding(), format: s.format(), offset: 0 })
        .collect();

    let mut vertex_spec = Vec::new();
    if let ShaderPermutation::SingleTexture { env_map, identity_color } = def.shader {
        vertex_spec.push(SpecializationConstant::bool(SPEC_ENV_MAP, env_map));
        vertex_spec.push(SpecializationConstant::bool(SPEC_IDENTITY_COLOR, identity_color));
    }
    vertex_spec.push(SpecializationConstant::bool(SPEC_CONSTANT_COLOR, def.constant_color));
    vertex_spec.push(SpecializationConstant::bool(SPEC_FOG, def.fog_stage));

    let fragment_spec = vec![
        SpecializationConstant { id: SPEC_ALPHA_TEST, value: def.state.alpha_test.shader_value() },
        SpecializationConstant::bool(SPEC_FOG, def.fog_stage),
        SpecializationConstant::bool(SPEC_ABS_LIGHT, def.abs_light),
        SpecializationConstant { id: SPEC_TEXTURE_ENV, value: texture_env(def.shader) },
        SpecializationConstant { id: SPEC_TEXTURE_COUNT, value: def.shader.texture_count() as u32 },
    ];

    let topology = match def.topology {
        Topology::Triangles => PrimitiveTopology::TriangleList,
        Topology::Lines => PrimitiveTopology::LineList,
        Topology::Points => PrimitiveTopology::PointList,
    };

    let raster = RasterState {
        polygon_mode: if def.state.wireframe { PolygonMode::Line } else { PolygonMode::Fill },
        cull_mode: cull_mode(def.cull, def.mirror),
        front_face: FrontFace::Clockwise,
        depth_bias: def.polygon_offset,
        depth_clamp: ctx.depth_clamp && def.shadow_phase == ShadowPhase::Edges,
        line_width: if def.wide_line && ctx.wide_lines { 2.0 } else { 1.0 },
    };

    let depth_stencil = if target.has_depth {
        DepthStencilState {
            depth_test: def.state.depth_test && def.shadow_phase != ShadowPhase::Finish,
            depth_write: def.state.depth_write && def.shadow_phase == ShadowPhase::None,
            depth_compare: def.state.depth_func.compare_op(),
            stencil: if ctx.stencil { shadow_stencil(def.shadow_phase) } else { None },
        }
    } else {
        DepthStencilState { depth_test: false, depth_write: false, depth_compare: CompareOp::Always, stencil: None }
    };

    let write_mask = if def.shadow_phase == ShadowPhase::Edges { ColorMask::empty() } else { ColorMask::all() };
    let blend = match def.state.blend {
        Some((src, dst)) => BlendState {
            enable: true,
            src_color: src.factor(),
            dst_color: dst.factor(),
            src_alpha: src.factor(),
            dst_alpha: dst.factor(),
            write_mask,
        },
        None => BlendState { write_mask, ..BlendState::default() },
    };

    Ok(GraphicsPipelineDesc {
        vertex: ShaderStageDesc { module: vertex_module, specialization: vertex_spec },
        fragment: ShaderStageDesc { module: fragment_module, specialization: fragment_spec },
        bindings,
        attributes,
        topology,
        raster,
        depth_stencil,
        blend,
        samples: target.samples,
        sample_shading: false,
        layout: ctx.layout,
        render_pass: target.render_pass,
    })
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
