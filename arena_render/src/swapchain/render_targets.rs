//! Everything that depends on the surface size, built and torn down as one
//!
//! A `RenderTargets` value is one epoch: swapchain, attachments, render
//! passes, framebuffers, the per-image "rendering finished" semaphores and
//! the descriptor sets post-processing samples attachments through. A
//! rebuild destroys the old epoch completely and builds a new one.

use crate::config::Config;
use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::builder::{PassTarget, PipelinePass};
use crate::render_pass::{PassFormats, RenderPassKind, RenderPassSet};
use crate::swapchain::attachments::*;
use crate::swapchain::present::describe_swapchain;
use crate::engine_info;

/// Sampler sets over the attachments post-processing reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostSets {
    /// Scene color (resolved when multisampled)
    pub scene: DescriptorSetHandle,
    pub screen_map: DescriptorSetHandle,
    /// `[level][image]`, empty without bloom
    pub bloom: Vec<[DescriptorSetHandle; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framebuffers {
    pub main: FramebufferHandle,
    pub screen_map: FramebufferHandle,
    /// `[level][image]`, empty without bloom
    pub bloom: Vec<[FramebufferHandle; 2]>,
    pub post_bloom: FramebufferHandle,
    /// One per swapchain image
    pub gamma: Vec<FramebufferHandle>,
    pub capture: FramebufferHandle,
}

/// Inputs of a render-target build
pub struct TargetParams<'a> {
    pub context: &'a DeviceContext,
    pub config: &'a Config,
    pub window_extent: Extent2D,
    pub sampler_layout: DescriptorSetLayoutHandle,
    /// Linear clamp sampler used for every post set
    pub sampler: SamplerHandle,
}

pub struct RenderTargets {
    pub swapchain: SwapchainImages,
    pub swapchain_desc: Option<SwapchainDesc>,
    pub render_extent: Extent2D,
    pub attachments: AttachmentSet,
    pub passes: RenderPassSet,
    pub framebuffers: Framebuffers,
    /// Signaled by each frame's submission, waited on by its present
    pub rendering_finished: Vec<SemaphoreHandle>,
    pub post_sets: PostSets,
    /// The surface cannot be read back; screenshots read a capture image
    pub capture_via_attachment: bool,
    pub bloom: bool,
    post_pool: DescriptorPoolHandle,
}

impl RenderTargets {
    pub(crate) fn empty() -> Self {
        Self {
            swapchain: SwapchainImages {
                swapchain: SwapchainHandle::NULL,
                images: Vec::new(),
                views: Vec::new(),
            },
            swapchain_desc: None,
            render_extent: Extent2D::default(),
            attachments: AttachmentSet::empty(),
            passes: RenderPassSet::empty(),
            framebuffers: Framebuffers::default(),
            rendering_finished: Vec::new(),
            post_sets: PostSets::default(),
            capture_via_attachment: false,
            bloom: false,
            post_pool: DescriptorPoolHandle::NULL,
        }
    }

    pub fn build(device: &mut dyn GpuDevice, params: &TargetParams<'_>) -> Result<Self> {
        let mut targets = Self::empty();
        match targets.populate(device, params) {
            Ok(()) => Ok(targets),
            Err(err) => {
                targets.destroy(device);
                Err(err)
            }
        }
    }

    fn populate(&mut self, device: &mut dyn GpuDevice, params: &TargetParams<'_>) -> Result<()> {
        let ctx = params.context;
        let surface = device.surface_capabilities()?;
        let desc = describe_swapchain(&surface, ctx.surface_format, params.window_extent, params.config.present_mode)?;
        self.swapchain = device.create_swapchain(&desc)?;
        self.swapchain_desc = Some(desc);
        for _ in 0..self.swapchain.images.len() {
            let semaphore = device.create_semaphore()?;
            self.rendering_finished.push(semaphore);
        }

        let window = desc.extent;
        let (width, height) = params.config.render_extent(window.width, window.height);
        self.render_extent = Extent2D::new(width, height);
        self.bloom = params.config.bloom;
        self.capture_via_attachment = !desc.usage.contains(ImageUsage::TRANSFER_SRC);

        let capture_format = Format::R8G8B8A8_UNORM;
        self.attachments = AttachmentSet::create(
            device,
            plan_attachments(&AttachmentConfig {
                render_extent: self.render_extent,
                window_extent: window,
                color_format: ctx.color_format,
                depth_format: ctx.depth_format,
                samples: ctx.samples,
                bloom: self.bloom,
                capture_format: self.capture_via_attachment.then_some(capture_format),
            }),
        )?;

        let mut kinds = vec![RenderPassKind::Main, RenderPassKind::ScreenMap, RenderPassKind::Gamma];
        if self.bloom {
            kinds.extend([RenderPassKind::BloomExtract, RenderPassKind::Blur, RenderPassKind::PostBloom]);
        }
        if self.capture_via_attachment {
            kinds.push(RenderPassKind::Capture);
        }
        let formats = PassFormats {
            color: ctx.color_format,
            depth: ctx.depth_format,
            samples: ctx.samples,
            surface: ctx.surface_format.format,
            capture: capture_format,
        };
        self.passes = RenderPassSet::create(device, &formats, &kinds)?;

        self.create_framebuffers(device, ctx, window)?;
        self.create_post_sets(device, params)?;

        engine_info!(
            "arena::targets",
            "Render targets: window {}x{}, render {}x{}, {} swapchain images, {:?}",
            window.width,
            window.height,
            self.render_extent.width,
            self.render_extent.height,
            self.swapchain.images.len(),
            desc.present_mode
        );
        Ok(())
    }

    fn pass(&self, kind: RenderPassKind) -> Result<RenderPassHandle> {
        self.passes
            .get(kind)
            .ok_or_else(|| Error::InvalidResource(format!("render pass {:?} not built", kind)))
    }

    fn framebuffer(
        device: &mut dyn GpuDevice,
        render_pass: RenderPassHandle,
        attachments: Vec<ImageViewHandle>,
        extent: Extent2D,
    ) -> Result<FramebufferHandle> {
        device.create_framebuffer(&FramebufferDesc {
            render_pass,
            attachments,
            width: extent.width,
            height: extent.height,
        })
    }

    fn create_framebuffers(&mut self, device: &mut dyn GpuDevice, ctx: &DeviceContext, window: Extent2D) -> Result<()> {
        let color = self.attachments.view(AttachmentKind::Color)?;
        let depth = self.attachments.view(AttachmentKind::Depth)?;
        let main_views = if ctx.msaa() {
            vec![self.attachments.view(AttachmentKind::Msaa)?, depth, color]
        } else {
            vec![color, depth]
        };
        let main_pass = self.pass(RenderPassKind::Main)?;
        self.framebuffers.main = Self::framebuffer(device, main_pass, main_views, self.render_extent)?;

        let screen_map_pass = self.pass(RenderPassKind::ScreenMap)?;
        self.framebuffers.screen_map = Self::framebuffer(
            device,
            screen_map_pass,
            vec![
                self.attachments.view(AttachmentKind::ScreenMapColor)?,
                self.attachments.view(AttachmentKind::ScreenMapDepth)?,
            ],
            screen_map_extent(self.render_extent),
        )?;

        if self.bloom {
            let blur_pass = self.pass(RenderPassKind::Blur)?;
            for level in 0..BLOOM_LEVELS {
                let extent = bloom_extent(self.render_extent, level);
                let mut pair = [FramebufferHandle::NULL; 2];
                for (index, slot) in pair.iter_mut().enumerate() {
                    let view = self.attachments.view(AttachmentKind::Bloom { level: level as u8, index: index as u8 })?;
                    *slot = Self::framebuffer(device, blur_pass, vec![view], extent)?;
                }
                self.framebuffers.bloom.push(pair);
            }
            let post_bloom_pass = self.pass(RenderPassKind::PostBloom)?;
            self.framebuffers.post_bloom = Self::framebuffer(device, post_bloom_pass, vec![color], self.render_extent)?;
        }

        let gamma_pass = self.pass(RenderPassKind::Gamma)?;
        for view in self.swapchain.views.clone() {
            let framebuffer = Self::framebuffer(device, gamma_pass, vec![view], window)?;
            self.framebuffers.gamma.push(framebuffer);
        }

        if self.capture_via_attachment {
            let capture_pass = self.pass(RenderPassKind::Capture)?;
            let view = self.attachments.view(AttachmentKind::Capture)?;
            self.framebuffers.capture = Self::framebuffer(device, capture_pass, vec![view], window)?;
        }
        Ok(())
    }

    fn create_post_sets(&mut self, device: &mut dyn GpuDevice, params: &TargetParams<'_>) -> Result<()> {
        let set_count = 2 + if self.bloom { BLOOM_LEVELS as u32 * 2 } else { 0 };
        self.post_pool = device.create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: set_count,
            uniform_dynamic: 0,
            storage_dynamic: 0,
            image_samplers: set_count,
        })?;

        let pool = self.post_pool;
        let sampled = |device: &mut dyn GpuDevice, view: ImageViewHandle| -> Result<DescriptorSetHandle> {
            let set = device.allocate_descriptor_set(pool, params.sampler_layout)?;
            device.write_image_descriptor(set, view, params.sampler)?;
            Ok(set)
        };

        let scene = sampled(device, self.attachments.view(AttachmentKind::Color)?)?;
        let screen_map = sampled(device, self.attachments.view(AttachmentKind::ScreenMapColor)?)?;
        let mut bloom = Vec::new();
        if self.bloom {
            for level in 0..BLOOM_LEVELS as u8 {
                let first = sampled(device, self.attachments.view(AttachmentKind::Bloom { level, index: 0 })?)?;
                let second = sampled(device, self.attachments.view(AttachmentKind::Bloom { level, index: 1 })?)?;
                bloom.push([first, second]);
            }
        }
        self.post_sets = PostSets { scene, screen_map, bloom };
        Ok(())
    }

    /// Size of the presented images
    pub fn window_extent(&self) -> Extent2D {
        self.swapchain_desc.map(|d| d.extent).unwrap_or_default()
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    /// Render passes the pipeline cache compiles against
    pub fn pass_targets(&self, samples: SampleCount) -> [Option<PassTarget>; PipelinePass::COUNT] {
        let target = |kind: RenderPassKind, samples: SampleCount, has_depth: bool| {
            self.passes.get(kind).map(|render_pass| PassTarget { render_pass, samples, has_depth })
        };
        [
            target(RenderPassKind::Main, samples, true),
            target(RenderPassKind::ScreenMap, SampleCount::S1, true),
            target(RenderPassKind::PostBloom, SampleCount::S1, false),
        ]
    }

    /// Image screenshots copy from, its layout once the frame is done, and
    /// its format
    pub fn readback_source(&self, image_index: u32) -> Result<(ImageHandle, ImageLayout, Format)> {
        if self.capture_via_attachment {
            let capture = self
                .attachments
                .get(AttachmentKind::Capture)
                .ok_or_else(|| Error::InvalidResource("no capture attachment".to_string()))?;
            Ok((capture.image, ImageLayout::TransferSrc, capture.desc.format))
        } else {
            let image = self
                .swapchain
                .images
                .get(image_index as usize)
                .copied()
                .ok_or_else(|| Error::InvalidResource(format!("no swapchain image {}", image_index)))?;
            let format = self.swapchain_desc.map(|d| d.format.format).unwrap_or(Format::Undefined);
            Ok((image, ImageLayout::PresentSrc, format))
        }
    }

    /// Destroy every object of the epoch. The device must be idle.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if !self.post_pool.is_null() {
            device.destroy_descriptor_pool(self.post_pool);
            self.post_pool = DescriptorPoolHandle::NULL;
        }
        self.post_sets = PostSets::default();

        let framebuffers = std::mem::take(&mut self.framebuffers);
        let bloom = framebuffers.bloom.iter().flatten().copied();
        for framebuffer in [framebuffers.main, framebuffers.screen_map, framebuffers.post_bloom, framebuffers.capture]
            .into_iter()
            .chain(bloom)
            .chain(framebuffers.gamma.iter().copied())
        {
            if !framebuffer.is_null() {
                device.destroy_framebuffer(framebuffer);
            }
        }

        self.passes.destroy(device);
        self.attachments.destroy(device);

        for semaphore in self.rendering_finished.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        if !self.swapchain.swapchain.is_null() {
            device.destroy_swapchain(self.swapchain.swapchain);
        }
        self.swapchain = SwapchainImages { swapchain: SwapchainHandle::NULL, images: Vec::new(), views: Vec::new() };
        self.swapchain_desc = None;
    }
}

#[cfg(test)]
#[path = "render_targets_tests.rs"]
mod tests;
