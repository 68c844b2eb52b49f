//! Materials as handed over by the shader parser
//!
//! A material is a list of stages; each stage names up to three texture
//! bundles, its fixed-function state and how vertex colors are generated.
//! `Material::finalize` turns every stage into pipeline definitions and picks
//! the stage iterator the material is drawn with.

use crate::error::{Error, Result};
use crate::pipeline::{CullType, PipelineCache, PipelineDefinition, PipelineIndex, ShaderPermutation, StateBits};
use crate::scene::DepthRange;
use crate::texture::TextureId;
use crate::engine_debug;

/// Texture coordinate source of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexCoordGen {
    #[default]
    Texture,
    Lightmap,
    /// Reflection vector computed in the vertex program
    EnvironmentMapped,
    Vector,
    Fog,
}

/// How bundles past the first combine with the previous result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultitextureEnv {
    #[default]
    None,
    Modulate,
    Add,
    /// Interpolate by the second vertex color
    Blend,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ColorGen {
    #[default]
    Identity,
    IdentityLighting,
    Vertex,
    /// Vertex colors not scaled by the overbright factor
    ExactVertex,
    Constant([u8; 3]),
    LightingDiffuse,
    Entity,
    Wave,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlphaGen {
    #[default]
    Identity,
    Skip,
    Vertex,
    Constant(u8),
    Entity,
    LightingSpecular,
    Portal,
}

/// Draw order class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MaterialSort {
    Portal,
    Environment,
    #[default]
    Opaque,
    Decal,
    SeeThrough,
    Banner,
    Fog,
    Underwater,
    Blend,
    Nearest,
}

/// Whether and how the fog pass is drawn over the material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FogPass {
    #[default]
    None,
    Equal,
    LessOrEqual,
}

/// Animated image list plus its coordinate source
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBundle {
    pub frames: Vec<TextureId>,
    pub frames_per_second: f32,
    pub tc_gen: TexCoordGen,
}

impl TextureBundle {
    pub fn single(texture: TextureId) -> Self {
        Self { frames: vec![texture], frames_per_second: 0.0, tc_gen: TexCoordGen::Texture }
    }

    /// Frame shown at `time` seconds
    pub fn frame_at(&self, time: f64) -> Option<TextureId> {
        if self.frames.len() <= 1 || self.frames_per_second <= 0.0 {
            return self.frames.first().copied();
        }
        let frame = (time * self.frames_per_second as f64).max(0.0) as usize;
        self.frames.get(frame % self.frames.len()).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterialStage {
    pub bundles: Vec<TextureBundle>,
    pub state: StateBits,
    pub multitexture: MultitextureEnv,
    pub rgb_gen: ColorGen,
    pub alpha_gen: AlphaGen,
}

impl MaterialStage {
    pub const MAX_BUNDLES: usize = 3;

    /// Shader permutation able to draw this stage
    pub fn permutation(&self) -> Result<ShaderPermutation> {
        let unsupported = || {
            Error::InvalidResource(format!(
                "{} texture bundles combined with {:?}",
                self.bundles.len(),
                self.multitexture
            ))
        };
        let shader = match (self.bundles.len(), self.multitexture) {
            (0, _) => ShaderPermutation::Color,
            (1, _) => ShaderPermutation::SingleTexture {
                env_map: self.bundles[0].tc_gen == TexCoordGen::EnvironmentMapped,
                identity_color: self.rgb_gen == ColorGen::Identity && self.alpha_gen == AlphaGen::Identity,
            },
            (2, MultitextureEnv::Modulate) => ShaderPermutation::MultiTextureMul2,
            (2, MultitextureEnv::Add) => ShaderPermutation::MultiTextureAdd2,
            (2, MultitextureEnv::Blend) => ShaderPermutation::MultiTextureBlend2,
            (3, MultitextureEnv::Modulate) => ShaderPermutation::MultiTextureMul3,
            (3, MultitextureEnv::Add) => ShaderPermutation::MultiTextureAdd3,
            _ => return Err(unsupported()),
        };
        Ok(shader)
    }

    fn definition(&self, material: &Material, variant: MaterialVariant) -> Result<PipelineDefinition> {
        let constant_color = matches!(self.rgb_gen, ColorGen::Constant(_))
            && matches!(self.alpha_gen, AlphaGen::Identity | AlphaGen::Constant(_));
        Ok(PipelineDefinition {
            shader: self.permutation()?,
            state: self.state,
            cull: material.cull,
            polygon_offset: material.polygon_offset,
            mirror: variant == MaterialVariant::Mirrored,
            fog_stage: variant == MaterialVariant::Fogged,
            abs_light: self.rgb_gen == ColorGen::ExactVertex,
            constant_color,
            ..PipelineDefinition::default()
        })
    }
}

/// Pipeline flavour a stage is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialVariant {
    Normal,
    /// Inside a mirror or portal view, culling flipped
    Mirrored,
    /// Fog applied by the stage program
    Fogged,
}

impl MaterialVariant {
    pub const COUNT: usize = 3;

    pub const ALL: [MaterialVariant; Self::COUNT] =
        [MaterialVariant::Normal, MaterialVariant::Mirrored, MaterialVariant::Fogged];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// How a material's stages are walked at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageIterator {
    #[default]
    Generic,
    /// Sky surfaces, pinned to the far plane
    Sky,
}

impl StageIterator {
    pub fn depth_range(self, requested: DepthRange) -> DepthRange {
        match self {
            StageIterator::Generic => requested,
            StageIterator::Sky => DepthRange::ForceOne,
        }
    }

    /// Call `draw` with every stage in order, the pipeline to bind and the
    /// depth range to draw with
    pub fn run<F>(self, material: &Material, variant: MaterialVariant, requested: DepthRange, mut draw: F) -> Result<()>
    where
        F: FnMut(&MaterialStage, PipelineIndex, DepthRange) -> Result<()>,
    {
        let range = self.depth_range(requested);
        for (index, stage) in material.stages.iter().enumerate() {
            let pipeline = material
                .pipeline(index, variant)
                .or_else(|| material.pipeline(index, MaterialVariant::Normal))
                .ok_or_else(|| Error::InvalidResource(format!("material '{}' is not finalized", material.name)))?;
            draw(stage, pipeline, range)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub stages: Vec<MaterialStage>,
    pub cull: CullType,
    pub polygon_offset: bool,
    pub sort: MaterialSort,
    pub is_sky: bool,
    pub fog_pass: FogPass,
    iterator: StageIterator,
    /// `[stage][variant]`
    pipelines: Vec<[Option<PipelineIndex>; MaterialVariant::COUNT]>,
}

impl Material {
    pub const MAX_STAGES: usize = 8;

    pub fn new(name: impl Into<String>, stages: Vec<MaterialStage>) -> Self {
        Self {
            name: name.into(),
            stages,
            cull: CullType::FrontSided,
            polygon_offset: false,
            sort: MaterialSort::Opaque,
            is_sky: false,
            fog_pass: FogPass::None,
            iterator: StageIterator::Generic,
            pipelines: Vec::new(),
        }
    }

    /// Pick the stage iterator and register every stage's pipelines
    pub fn finalize(&mut self, cache: &mut PipelineCache) -> Result<()> {
        if self.stages.len() > Self::MAX_STAGES {
            return Err(Error::InvalidResource(format!(
                "material '{}' has {} stages",
                self.name,
                self.stages.len()
            )));
        }
        self.iterator = if self.is_sky { StageIterator::Sky } else { StageIterator::Generic };

        let mut pipelines = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let mut per_variant = [None; MaterialVariant::COUNT];
            for variant in MaterialVariant::ALL {
                if variant == MaterialVariant::Fogged && self.fog_pass == FogPass::None {
                    continue;
                }
                let definition = stage.definition(self, variant)?;
                per_variant[variant.index()] = Some(cache.find_or_register(&definition)?);
            }
            pipelines.push(per_variant);
        }
        self.pipelines = pipelines;
        engine_debug!(
            "arena::material",
            "Finalized '{}': {} stages, {:?} iterator",
            self.name,
            self.stages.len(),
            self.iterator
        );
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.pipelines.len() == self.stages.len() && !self.stages.is_empty()
    }

    pub fn iterator(&self) -> StageIterator {
        self.iterator
    }

    pub fn pipeline(&self, stage: usize, variant: MaterialVariant) -> Option<PipelineIndex> {
        self.pipelines.get(stage).and_then(|p| p[variant.index()])
    }
}

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
