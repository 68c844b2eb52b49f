//! Fullscreen post-process passes: bloom ladder, gamma and capture
//!
//! All programs draw one oversized triangle with `fullscreen.vert`.
//! Pipelines depend on the final image sizes (blur texel offsets) so they are
//! rebuilt together with the render targets.

use crate::descriptors::POST_SAMPLER_SLOTS;
use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::shaders::ShaderLibrary;
use crate::render_pass::RenderPassKind;
use crate::swapchain::attachments::{bloom_extent, BLOOM_LEVELS};
use crate::swapchain::render_targets::RenderTargets;
use crate::engine_debug;

pub const SPEC_GAMMA: u32 = 0;
pub const SPEC_OVERBRIGHT: u32 = 1;
pub const SPEC_THRESHOLD: u32 = 2;
pub const SPEC_TEXEL_X: u32 = 3;
pub const SPEC_TEXEL_Y: u32 = 4;

/// Values baked into the post-process programs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostParams {
    pub gamma: f32,
    pub overbright_bits: u32,
    pub bloom_threshold: f32,
}

/// Blur direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurAxis {
    Horizontal = 0,
    Vertical = 1,
}

pub struct PostProcess {
    gamma: PipelineHandle,
    capture: PipelineHandle,
    bloom_extract: PipelineHandle,
    /// `[level][axis]`
    blur: Vec<[PipelineHandle; 2]>,
    bloom_blend: PipelineHandle,
}

struct FullscreenTarget {
    render_pass: RenderPassHandle,
    framebuffer: FramebufferHandle,
    extent: Extent2D,
}

impl PostProcess {
    pub(crate) fn empty() -> Self {
        Self {
            gamma: PipelineHandle::NULL,
            capture: PipelineHandle::NULL,
            bloom_extract: PipelineHandle::NULL,
            blur: Vec::new(),
            bloom_blend: PipelineHandle::NULL,
        }
    }

    /// Build every pipeline the current targets need
    pub fn build(
        device: &mut dyn GpuDevice,
        shaders: &ShaderLibrary,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
        params: &PostParams,
    ) -> Result<Self> {
        let mut post = Self::empty();
        if let Err(err) = post.populate(device, shaders, layout, targets, params) {
            post.destroy(device);
            return Err(err);
        }
        engine_debug!("arena::post", "Built {} post-process pipelines", post.pipeline_count());
        Ok(post)
    }

    fn populate(
        &mut self,
        device: &mut dyn GpuDevice,
        shaders: &ShaderLibrary,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
        params: &PostParams,
    ) -> Result<()> {
        let pass = |kind: RenderPassKind| pass_handle(targets, kind);
        let tone = vec![
            SpecializationConstant::float(SPEC_GAMMA, 1.0 / params.gamma),
            SpecializationConstant::float(SPEC_OVERBRIGHT, (1u32 << params.overbright_bits) as f32),
        ];

        self.gamma = fullscreen_pipeline(device, shaders, layout, pass(RenderPassKind::Gamma)?, "gamma.frag", tone.clone(), false)?;
        if targets.capture_via_attachment {
            self.capture = fullscreen_pipeline(device, shaders, layout, pass(RenderPassKind::Capture)?, "gamma.frag", tone, false)?;
        }

        if targets.bloom {
            self.bloom_extract = fullscreen_pipeline(
                device,
                shaders,
                layout,
                pass(RenderPassKind::BloomExtract)?,
                "bloom_extract.frag",
                vec![SpecializationConstant::float(SPEC_THRESHOLD, params.bloom_threshold)],
                false,
            )?;
            let blur_pass = pass(RenderPassKind::Blur)?;
            for level in 0..BLOOM_LEVELS {
                let extent = bloom_extent(targets.render_extent, level);
                let mut pair = [PipelineHandle::NULL; 2];
                for (axis, slot) in pair.iter_mut().enumerate() {
                    let (x, y) = if axis == BlurAxis::Horizontal as usize {
                        (1.0 / extent.width as f32, 0.0)
                    } else {
                        (0.0, 1.0 / extent.height as f32)
                    };
                    *slot = fullscreen_pipeline(
                        device,
                        shaders,
                        layout,
                        blur_pass,
                        "blur.frag",
                        vec![SpecializationConstant::float(SPEC_TEXEL_X, x), SpecializationConstant::float(SPEC_TEXEL_Y, y)],
                        false,
                    )?;
                }
                self.blur.push(pair);
            }
            self.bloom_blend = fullscreen_pipeline(
                device,
                shaders,
                layout,
                pass(RenderPassKind::PostBloom)?,
                "bloom_blend.frag",
                Vec::new(),
                true,
            )?;
        }
        Ok(())
    }

    pub fn pipeline_count(&self) -> usize {
        [self.gamma, self.capture, self.bloom_extract, self.bloom_blend]
            .iter()
            .chain(self.blur.iter().flatten())
            .filter(|h| !h.is_null())
            .count()
    }

    pub fn blur_pipeline(&self, level: usize, axis: BlurAxis) -> Option<PipelineHandle> {
        self.blur.get(level).map(|pair| pair[axis as usize])
    }

    // ===== RECORDING =====

    /// Bright-pass extract and the blur ladder. Must be recorded outside any
    /// render pass, after the main pass ended.
    pub fn record_bloom(
        &self,
        device: &mut dyn GpuDevice,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
    ) -> Result<()> {
        let extract_pass = pass_handle(targets, RenderPassKind::BloomExtract)?;
        let blur_pass = pass_handle(targets, RenderPassKind::Blur)?;
        let sets = &targets.post_sets.bloom;
        let fbs = &targets.framebuffers.bloom;
        if sets.len() < BLOOM_LEVELS || fbs.len() < BLOOM_LEVELS || self.blur.len() < BLOOM_LEVELS {
            return Err(Error::InvalidResource("bloom chain not built".to_string()));
        }

        let level0 = bloom_extent(targets.render_extent, 0);
        draw_fullscreen(
            device,
            cmd,
            layout,
            self.bloom_extract,
            &FullscreenTarget { render_pass: extract_pass, framebuffer: fbs[0][0], extent: level0 },
            &[targets.post_sets.scene],
        )?;

        for level in 0..BLOOM_LEVELS {
            let extent = bloom_extent(targets.render_extent, level);
            let source = if level == 0 { sets[0][0] } else { sets[level - 1][0] };
            draw_fullscreen(
                device,
                cmd,
                layout,
                self.blur[level][BlurAxis::Horizontal as usize],
                &FullscreenTarget { render_pass: blur_pass, framebuffer: fbs[level][1], extent },
                &[source],
            )?;
            draw_fullscreen(
                device,
                cmd,
                layout,
                self.blur[level][BlurAxis::Vertical as usize],
                &FullscreenTarget { render_pass: blur_pass, framebuffer: fbs[level][0], extent },
                &[sets[level][1]],
            )?;
        }
        Ok(())
    }

    /// Additive composite of every bloom level; recorded inside the
    /// post-bloom pass
    pub fn record_bloom_composite(
        &self,
        device: &mut dyn GpuDevice,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
    ) -> Result<()> {
        let sets: Vec<DescriptorSetHandle> = targets.post_sets.bloom.iter().map(|pair| pair[0]).collect();
        if sets.len() < POST_SAMPLER_SLOTS {
            return Err(Error::InvalidResource("bloom chain not built".to_string()));
        }
        device.record(cmd, &Command::BindPipeline(self.bloom_blend))?;
        device.record(
            cmd,
            &Command::BindDescriptorSets { layout, first_set: 0, sets, dynamic_offsets: Vec::new() },
        )?;
        set_full_viewport(device, cmd, targets.render_extent)?;
        device.record(cmd, &Command::Draw { vertex_count: 3, first_vertex: 0 })
    }

    /// Gamma pass from the scene color into swapchain image `image_index`
    pub fn record_gamma(
        &self,
        device: &mut dyn GpuDevice,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
        image_index: u32,
    ) -> Result<()> {
        let framebuffer = targets
            .framebuffers
            .gamma
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("no framebuffer for image {}", image_index)))?;
        draw_fullscreen(
            device,
            cmd,
            layout,
            self.gamma,
            &FullscreenTarget {
                render_pass: pass_handle(targets, RenderPassKind::Gamma)?,
                framebuffer,
                extent: targets.window_extent(),
            },
            &[targets.post_sets.scene],
        )
    }

    /// Same as the gamma pass, into the capture image
    pub fn record_capture(
        &self,
        device: &mut dyn GpuDevice,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        targets: &RenderTargets,
    ) -> Result<()> {
        draw_fullscreen(
            device,
            cmd,
            layout,
            self.capture,
            &FullscreenTarget {
                render_pass: pass_handle(targets, RenderPassKind::Capture)?,
                framebuffer: targets.framebuffers.capture,
                extent: targets.window_extent(),
            },
            &[targets.post_sets.scene],
        )
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        let blur = std::mem::take(&mut self.blur);
        for pipeline in [self.gamma, self.capture, self.bloom_extract, self.bloom_blend]
            .into_iter()
            .chain(blur.into_iter().flatten())
        {
            if !pipeline.is_null() {
                device.destroy_pipeline(pipeline);
            }
        }
        *self = Self::empty();
    }
}

fn pass_handle(targets: &RenderTargets, kind: RenderPassKind) -> Result<RenderPassHandle> {
    targets
        .passes
        .get(kind)
        .ok_or_else(|| Error::InvalidResource(format!("render pass {:?} not built", kind)))
}

fn fullscreen_pipeline(
    device: &mut dyn GpuDevice,
    shaders: &ShaderLibrary,
    layout: PipelineLayoutHandle,
    render_pass: RenderPassHandle,
    fragment: &str,
    specialization: Vec<SpecializationConstant>,
    additive: bool,
) -> Result<PipelineHandle> {
    let blend = if additive {
        BlendState {
            enable: true,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::One,
            write_mask: ColorMask::all(),
        }
    } else {
        BlendState::default()
    };
    device.create_graphics_pipeline(&GraphicsPipelineDesc {
        vertex: ShaderStageDesc { module: shaders.get("fullscreen.vert")?, specialization: Vec::new() },
        fragment: ShaderStageDesc { module: shaders.get(fragment)?, specialization },
        bindings: Vec::new(),
        attributes: Vec::new(),
        topology: PrimitiveTopology::TriangleList,
        raster: RasterState::default(),
        depth_stencil: DepthStencilState {
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::Always,
            stencil: None,
        },
        blend,
        samples: SampleCount::S1,
        sample_shading: false,
        layout,
        render_pass,
    })
}

fn set_full_viewport(device: &mut dyn GpuDevice, cmd: CommandBufferHandle, extent: Extent2D) -> Result<()> {
    device.record(
        cmd,
        &Command::SetViewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }),
    )?;
    device.record(cmd, &Command::SetScissor(Rect2D::from_extent(extent)))
}

/// One complete render pass drawing a fullscreen triangle. `inputs` fill the
/// sampler sets in order; unused sets repeat the first input.
fn draw_fullscreen(
    device: &mut dyn GpuDevice,
    cmd: CommandBufferHandle,
    layout: PipelineLayoutHandle,
    pipeline: PipelineHandle,
    target: &FullscreenTarget,
    inputs: &[DescriptorSetHandle],
) -> Result<()> {
    let first = inputs
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidResource("fullscreen pass without input".to_string()))?;
    let sets: Vec<DescriptorSetHandle> = (0..POST_SAMPLER_SLOTS).map(|i| inputs.get(i).copied().unwrap_or(first)).collect();

    device.record(
        cmd,
        &Command::BeginRenderPass {
            render_pass: target.render_pass,
            framebuffer: target.framebuffer,
            area: Rect2D::from_extent(target.extent),
            clear_values: Vec::new(),
        },
    )?;
    device.record(cmd, &Command::BindPipeline(pipeline))?;
    device.record(cmd, &Command::BindDescriptorSets { layout, first_set: 0, sets, dynamic_offsets: Vec::new() })?;
    set_full_viewport(device, cmd, target.extent)?;
    device.record(cmd, &Command::Draw { vertex_count: 3, first_vertex: 0 })?;
    device.record(cmd, &Command::EndRenderPass)
}

#[cfg(test)]
#[path = "postprocess_tests.rs"]
mod tests;
