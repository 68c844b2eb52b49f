//! Render state records and the pipeline definition key
//!
//! `StateBits` is the structured form of the packed state integer produced
//! by the material parser. Only legal values can be represented: blend
//! factors, depth function and alpha test function are closed enums.

use std::convert::TryFrom;

use crate::device::{BlendFactor, CompareOp};
use crate::error::Error;

// ============================================================================
// PACKED STATE LAYOUT
// ============================================================================

/// Bit layout of the packed state integer
pub mod gls {
    pub const SRCBLEND_ZERO: u32 = 0x0000_0001;
    pub const SRCBLEND_ONE: u32 = 0x0000_0002;
    pub const SRCBLEND_DST_COLOR: u32 = 0x0000_0003;
    pub const SRCBLEND_ONE_MINUS_DST_COLOR: u32 = 0x0000_0004;
    pub const SRCBLEND_SRC_ALPHA: u32 = 0x0000_0005;
    pub const SRCBLEND_ONE_MINUS_SRC_ALPHA: u32 = 0x0000_0006;
    pub const SRCBLEND_DST_ALPHA: u32 = 0x0000_0007;
    pub const SRCBLEND_ONE_MINUS_DST_ALPHA: u32 = 0x0000_0008;
    pub const SRCBLEND_ALPHA_SATURATE: u32 = 0x0000_0009;
    pub const SRCBLEND_BITS: u32 = 0x0000_000f;

    pub const DSTBLEND_ZERO: u32 = 0x0000_0010;
    pub const DSTBLEND_ONE: u32 = 0x0000_0020;
    pub const DSTBLEND_SRC_COLOR: u32 = 0x0000_0030;
    pub const DSTBLEND_ONE_MINUS_SRC_COLOR: u32 = 0x0000_0040;
    pub const DSTBLEND_SRC_ALPHA: u32 = 0x0000_0050;
    pub const DSTBLEND_ONE_MINUS_SRC_ALPHA: u32 = 0x0000_0060;
    pub const DSTBLEND_DST_ALPHA: u32 = 0x0000_0070;
    pub const DSTBLEND_ONE_MINUS_DST_ALPHA: u32 = 0x0000_0080;
    pub const DSTBLEND_BITS: u32 = 0x0000_00f0;

    pub const DEPTHMASK_TRUE: u32 = 0x0000_0100;
    pub const POLYMODE_LINE: u32 = 0x0000_1000;
    pub const DEPTHTEST_DISABLE: u32 = 0x0001_0000;
    pub const DEPTHFUNC_EQUAL: u32 = 0x0002_0000;
    pub const DEPTHFUNC_GREATER: u32 = 0x0004_0000;

    pub const ATEST_GT_0: u32 = 0x1000_0000;
    pub const ATEST_LT_80: u32 = 0x2000_0000;
    pub const ATEST_GE_80: u32 = 0x4000_0000;
    pub const ATEST_BITS: u32 = 0x7000_0000;

    pub const ALL_BITS: u32 = SRCBLEND_BITS
        | DSTBLEND_BITS
        | DEPTHMASK_TRUE
        | POLYMODE_LINE
        | DEPTHTEST_DISABLE
        | DEPTHFUNC_EQUAL
        | DEPTHFUNC_GREATER
        | ATEST_BITS;
}

// ============================================================================
// STATE ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendSrc {
    Zero,
    One,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    AlphaSaturate,
}

impl BlendSrc {
    pub fn factor(self) -> BlendFactor {
        match self {
            BlendSrc::Zero => BlendFactor::Zero,
            BlendSrc::One => BlendFactor::One,
            BlendSrc::DstColor => BlendFactor::DstColor,
            BlendSrc::OneMinusDstColor => BlendFactor::OneMinusDstColor,
            BlendSrc::SrcAlpha => BlendFactor::SrcAlpha,
            BlendSrc::OneMinusSrcAlpha => BlendFactor::OneMinusSrcAlpha,
            BlendSrc::DstAlpha => BlendFactor::DstAlpha,
            BlendSrc::OneMinusDstAlpha => BlendFactor::OneMinusDstAlpha,
            BlendSrc::AlphaSaturate => BlendFactor::SrcAlphaSaturate,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            gls::SRCBLEND_ZERO => BlendSrc::Zero,
            gls::SRCBLEND_ONE => BlendSrc::One,
            gls::SRCBLEND_DST_COLOR => BlendSrc::DstColor,
            gls::SRCBLEND_ONE_MINUS_DST_COLOR => BlendSrc::OneMinusDstColor,
            gls::SRCBLEND_SRC_ALPHA => BlendSrc::SrcAlpha,
            gls::SRCBLEND_ONE_MINUS_SRC_ALPHA => BlendSrc::OneMinusSrcAlpha,
            gls::SRCBLEND_DST_ALPHA => BlendSrc::DstAlpha,
            gls::SRCBLEND_ONE_MINUS_DST_ALPHA => BlendSrc::OneMinusDstAlpha,
            gls::SRCBLEND_ALPHA_SATURATE => BlendSrc::AlphaSaturate,
            _ => return None,
        })
    }

    fn bits(self) -> u32 {
        match self {
            BlendSrc::Zero => gls::SRCBLEND_ZERO,
            BlendSrc::One => gls::SRCBLEND_ONE,
            BlendSrc::DstColor => gls::SRCBLEND_DST_COLOR,
            BlendSrc::OneMinusDstColor => gls::SRCBLEND_ONE_MINUS_DST_COLOR,
            BlendSrc::SrcAlpha => gls::SRCBLEND_SRC_ALPHA,
            BlendSrc::OneMinusSrcAlpha => gls::SRCBLEND_ONE_MINUS_SRC_ALPHA,
            BlendSrc::DstAlpha => gls::SRCBLEND_DST_ALPHA,
            BlendSrc::OneMinusDstAlpha => gls::SRCBLEND_ONE_MINUS_DST_ALPHA,
            BlendSrc::AlphaSaturate => gls::SRCBLEND_ALPHA_SATURATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendDst {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendDst {
    pub fn factor(self) -> BlendFactor {
        match self {
            BlendDst::Zero => BlendFactor::Zero,
            BlendDst::One => BlendFactor::One,
            BlendDst::SrcColor => BlendFactor::SrcColor,
            BlendDst::OneMinusSrcColor => BlendFactor::OneMinusSrcColor,
            BlendDst::SrcAlpha => BlendFactor::SrcAlpha,
            BlendDst::OneMinusSrcAlpha => BlendFactor::OneMinusSrcAlpha,
            BlendDst::DstAlpha => BlendFactor::DstAlpha,
            BlendDst::OneMinusDstAlpha => BlendFactor::OneMinusDstAlpha,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            gls::DSTBLEND_ZERO => BlendDst::Zero,
            gls::DSTBLEND_ONE => BlendDst::One,
            gls::DSTBLEND_SRC_COLOR => BlendDst::SrcColor,
            gls::DSTBLEND_ONE_MINUS_SRC_COLOR => BlendDst::OneMinusSrcColor,
            gls::DSTBLEND_SRC_ALPHA => BlendDst::SrcAlpha,
            gls::DSTBLEND_ONE_MINUS_SRC_ALPHA => BlendDst::OneMinusSrcAlpha,
            gls::DSTBLEND_DST_ALPHA => BlendDst::DstAlpha,
            gls::DSTBLEND_ONE_MINUS_DST_ALPHA => BlendDst::OneMinusDstAlpha,
            _ => return None,
        })
    }

    fn bits(self) -> u32 {
        match self {
            BlendDst::Zero => gls::DSTBLEND_ZERO,
            BlendDst::One => gls::DSTBLEND_ONE,
            BlendDst::SrcColor => gls::DSTBLEND_SRC_COLOR,
            BlendDst::OneMinusSrcColor => gls::DSTBLEND_ONE_MINUS_SRC_COLOR,
            BlendDst::SrcAlpha => gls::DSTBLEND_SRC_ALPHA,
            BlendDst::OneMinusSrcAlpha => gls::DSTBLEND_ONE_MINUS_SRC_ALPHA,
            BlendDst::DstAlpha => gls::DSTBLEND_DST_ALPHA,
            BlendDst::OneMinusDstAlpha => gls::DSTBLEND_ONE_MINUS_DST_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    LessOrEqual,
    Equal,
    Greater,
}

impl DepthFunc {
    pub fn compare_op(self) -> CompareOp {
        match self {
            DepthFunc::LessOrEqual => CompareOp::LessOrEqual,
            DepthFunc::Equal => CompareOp::Equal,
            DepthFunc::Greater => CompareOp::Greater,
        }
    }
}

/// Fragment discard rule applied in the fragment shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaTest {
    None,
    /// Keep alpha > 0
    Gt0,
    /// Keep alpha < 0.5
    Lt80,
    /// Keep alpha >= 0.5
    Ge80,
}

impl AlphaTest {
    /// Specialization value the fragment shaders switch on
    pub fn shader_value(self) -> u32 {
        match self {
            AlphaTest::None => 0,
            AlphaTest::Gt0 => 1,
            AlphaTest::Lt80 => 2,
            AlphaTest::Ge80 => 3,
        }
    }
}

// ============================================================================
// STATE BITS
// ============================================================================

/// Fixed-function state of one material stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateBits {
    /// Source/destination factors, `None` disables blending
    pub blend: Option<(BlendSrc, BlendDst)>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub alpha_test: AlphaTest,
    /// Rasterize as lines
    pub wireframe: bool,
}

impl Default for StateBits {
    /// Opaque: depth test and depth write on, no blending
    fn default() -> Self {
        Self {
            blend: None,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::LessOrEqual,
            alpha_test: AlphaTest::None,
            wireframe: false,
        }
    }
}

impl StateBits {
    pub fn blended(src: BlendSrc, dst: BlendDst) -> Self {
        Self { blend: Some((src, dst)), depth_write: false, ..Self::default() }
    }

    /// Packed form of the state
    pub fn to_bits(&self) -> u32 {
        let mut bits = 0;
        if let Some((src, dst)) = self.blend {
            bits |= src.bits() | dst.bits();
        }
        if self.depth_write {
            bits |= gls::DEPTHMASK_TRUE;
        }
        if self.wireframe {
            bits |= gls::POLYMODE_LINE;
        }
        if !self.depth_test {
            bits |= gls::DEPTHTEST_DISABLE;
        }
        bits |= match self.depth_func {
            DepthFunc::LessOrEqual => 0,
            DepthFunc::Equal => gls::DEPTHFUNC_EQUAL,
            DepthFunc::Greater => gls::DEPTHFUNC_GREATER,
        };
        bits |= match self.alpha_test {
            AlphaTest::None => 0,
            AlphaTest::Gt0 => gls::ATEST_GT_0,
            AlphaTest::Lt80 => gls::ATEST_LT_80,
            AlphaTest::Ge80 => gls::ATEST_GE_80,
        };
        bits
    }
}

impl TryFrom<u32> for StateBits {
    type Error = Error;

    /// Decode a packed state integer, rejecting unknown bits and illegal
    /// combinations (half-specified blending, two depth functions, more than
    /// one alpha test)
    fn try_from(bits: u32) -> Result<Self, Error> {
        let illegal = |what: &str| Err(Error::InvalidResource(format!("state bits {:#010x}: {}", bits, what)));

        if bits & !gls::ALL_BITS != 0 {
            return illegal("unknown bits set");
        }

        let src = bits & gls::SRCBLEND_BITS;
        let dst = bits & gls::DSTBLEND_BITS;
        let blend = match (src, dst) {
            (0, 0) => None,
            (0, _) | (_, 0) => return illegal("blend needs both factors"),
            _ => match (BlendSrc::from_bits(src), BlendDst::from_bits(dst)) {
                (Some(s), Some(d)) => Some((s, d)),
                _ => return illegal("unknown blend factor"),
            },
        };

        let depth_func = match (bits & gls::DEPTHFUNC_EQUAL != 0, bits & gls::DEPTHFUNC_GREATER != 0) {
            (false, false) => DepthFunc::LessOrEqual,
            (true, false) => DepthFunc::Equal,
            (false, true) => DepthFunc::Greater,
            (true, true) => return illegal("two depth functions"),
        };

        let alpha_test = match bits & gls::ATEST_BITS {
            0 => AlphaTest::None,
            gls::ATEST_GT_0 => AlphaTest::Gt0,
            gls::ATEST_LT_80 => AlphaTest::Lt80,
            gls::ATEST_GE_80 => AlphaTest::Ge80,
            _ => return illegal("more than one alpha test"),
        };

        Ok(StateBits {
            blend,
            depth_test: bits & gls::DEPTHTEST_DISABLE == 0,
            depth_write: bits & gls::DEPTHMASK_TRUE != 0,
            depth_func,
            alpha_test,
            wireframe: bits & gls::POLYMODE_LINE != 0,
        })
    }
}

// ============================================================================
// PIPELINE DEFINITION
// ============================================================================

/// Face culling requested by a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullType {
    FrontSided,
    BackSided,
    TwoSided,
}

/// Vertex/fragment program pair plus its input layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPermutation {
    /// One texture; optionally environment mapped, optionally without a
    /// vertex color stream (identity color)
    SingleTexture { env_map: bool, identity_color: bool },
    /// Two textures combined by multiplication
    MultiTextureMul2,
    /// Two textures combined by addition
    MultiTextureAdd2,
    /// Three textures combined by multiplication
    MultiTextureMul3,
    /// Three textures combined by addition
    MultiTextureAdd3,
    /// Second texture blended over the first by its alpha
    MultiTextureBlend2,
    /// Vertex color only
    Color,
    /// Dynamic light contribution
    Light { line: bool },
    /// Fog volume / fog pass
    Fog,
    /// Screen-space point sprite (flare visibility)
    Dot,
}

impl ShaderPermutation {
    /// Number of texture descriptor slots the fragment program reads
    pub fn texture_count(self) -> usize {
        match self {
            ShaderPermutation::SingleTexture { .. } | ShaderPermutation::Light { .. } => 1,
            ShaderPermutation::MultiTextureMul2
            | ShaderPermutation::MultiTextureAdd2
            | ShaderPermutation::MultiTextureBlend2 => 2,
            ShaderPermutation::MultiTextureMul3 | ShaderPermutation::MultiTextureAdd3 => 3,
            ShaderPermutation::Color | ShaderPermutation::Dot => 0,
            ShaderPermutation::Fog => 1,
        }
    }
}

/// Stage of the stencil shadow-volume technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowPhase {
    None,
    /// Volume edges, incrementing/decrementing stencil
    Edges,
    /// Fullscreen darkening where stencil != 0
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Lines,
    Points,
}

/// Everything a compiled pipeline depends on, apart from the render pass
///
/// Two definitions share a compiled pipeline only when all fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineDefinition {
    pub shader: ShaderPermutation,
    pub state: StateBits,
    pub cull: CullType,
    pub polygon_offset: bool,
    /// Mirror view: front face winding is flipped
    pub mirror: bool,
    pub topology: Topology,
    /// Apply fog in the fragment program
    pub fog_stage: bool,
    pub shadow_phase: ShadowPhase,
    /// 2 pixel lines (needs the wide lines feature)
    pub wide_line: bool,
    /// Lighting is not scaled by the overbright factor
    pub abs_light: bool,
    /// Color comes from a push constant instead of a vertex stream
    pub constant_color: bool,
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self {
            shader: ShaderPermutation::SingleTexture { env_map: false, identity_color: false },
            state: StateBits::default(),
            cull: CullType::FrontSided,
            polygon_offset: false,
            mirror: false,
            topology: Topology::Triangles,
            fog_stage: false,
            shadow_phase: ShadowPhase::None,
            wide_line: false,
            abs_light: false,
            constant_color: false,
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
