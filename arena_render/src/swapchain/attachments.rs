//! Framebuffer attachments of one render-target epoch
//!
//! All attachments are created as one batch and placed in a dedicated image
//! chunk pool sized to the batch. Images are placed in memory grouped by
//! usage flags: every image with one usage combination is allocated before
//! any image with the next, which keeps same-usage attachments adjacent.

use crate::device::*;
use crate::error::{Error, Result};
use crate::memory::{align_up, ImageChunkPool};
use crate::engine_debug;

/// Number of levels in the bloom chain
pub const BLOOM_LEVELS: usize = 4;

/// Role of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// Single-sampled scene color, sampled by the post passes
    Color,
    Depth,
    /// Multisampled scene color, resolved into `Color`
    Msaa,
    ScreenMapColor,
    ScreenMapDepth,
    /// Two ping-pong images per bloom level
    Bloom { level: u8, index: u8 },
    /// Transfer-source copy of the final image for screenshots
    Capture,
}

/// Inputs of attachment planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentConfig {
    pub render_extent: Extent2D,
    pub window_extent: Extent2D,
    pub color_format: Format,
    pub depth_format: Format,
    pub samples: SampleCount,
    pub bloom: bool,
    /// Format of the capture image, `None` if screenshots read the swapchain
    pub capture_format: Option<Format>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRequest {
    pub kind: AttachmentKind,
    pub desc: ImageDesc,
}

/// Screen-map size: 1/16th of the render size, at least 4x4
pub fn screen_map_extent(render: Extent2D) -> Extent2D {
    Extent2D::new((render.width / 16).max(4), (render.height / 16).max(4))
}

/// Size of bloom `level`; level 0 is half the render size
pub fn bloom_extent(render: Extent2D, level: usize) -> Extent2D {
    let shift = level as u32 + 1;
    Extent2D::new((render.width >> shift).max(1), (render.height >> shift).max(1))
}

fn request(kind: AttachmentKind, name: String, extent: Extent2D, format: Format, samples: SampleCount, usage: ImageUsage) -> AttachmentRequest {
    AttachmentRequest {
        kind,
        desc: ImageDesc {
            name,
            width: extent.width,
            height: extent.height,
            mip_levels: 1,
            format,
            samples,
            usage,
        },
    }
}

/// Every attachment the configuration needs, in declaration order
pub fn plan_attachments(config: &AttachmentConfig) -> Vec<AttachmentRequest> {
    let sampled_color = ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED;
    let depth_usage = ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::TRANSIENT_ATTACHMENT;
    let render = config.render_extent;
    let mut plan = vec![
        request(AttachmentKind::Color, "color".to_string(), render, config.color_format, SampleCount::S1, sampled_color),
        request(AttachmentKind::Depth, "depth".to_string(), render, config.depth_format, config.samples, depth_usage),
    ];

    if config.samples != SampleCount::S1 {
        plan.push(request(
            AttachmentKind::Msaa,
            "msaa".to_string(),
            render,
            config.color_format,
            config.samples,
            ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSIENT_ATTACHMENT,
        ));
    }

    let screen_map = screen_map_extent(render);
    plan.push(request(
        AttachmentKind::ScreenMapColor,
        "screen_map".to_string(),
        screen_map,
        config.color_format,
        SampleCount::S1,
        sampled_color,
    ));
    plan.push(request(
        AttachmentKind::ScreenMapDepth,
        "screen_map_depth".to_string(),
        screen_map,
        config.depth_format,
        SampleCount::S1,
        depth_usage,
    ));

    if config.bloom {
        for level in 0..BLOOM_LEVELS {
            for index in 0..2 {
                plan.push(request(
                    AttachmentKind::Bloom { level: level as u8, index: index as u8 },
                    format!("bloom{}_{}", level, index),
                    bloom_extent(render, level),
                    config.color_format,
                    SampleCount::S1,
                    sampled_color,
                ));
            }
        }
    }

    if let Some(format) = config.capture_format {
        plan.push(request(
            AttachmentKind::Capture,
            "capture".to_string(),
            config.window_extent,
            format,
            SampleCount::S1,
            ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
        ));
    }
    plan
}

/// Indices of `requests` in memory placement order: stable sort by usage
pub fn allocation_order(requests: &[AttachmentRequest]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by_key(|&i| requests[i].desc.usage.bits());
    order
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub desc: ImageDesc,
    pub offset: u64,
}

pub struct AttachmentSet {
    attachments: Vec<Attachment>,
    pool: ImageChunkPool,
    placement: Vec<AttachmentKind>,
}

impl AttachmentSet {
    /// Set holding no attachments
    pub fn empty() -> Self {
        Self { attachments: Vec::new(), pool: ImageChunkPool::new(0, 0), placement: Vec::new() }
    }

    pub fn create(device: &mut dyn GpuDevice, requests: Vec<AttachmentRequest>) -> Result<Self> {
        let mut set = Self::empty();
        match set.populate(device, requests) {
            Ok(()) => Ok(set),
            Err(err) => {
                set.destroy(device);
                Err(err)
            }
        }
    }

    fn populate(&mut self, device: &mut dyn GpuDevice, requests: Vec<AttachmentRequest>) -> Result<()> {
        let mut requirements = Vec::with_capacity(requests.len());
        for request in &requests {
            let (image, reqs) = device.create_image(&request.desc)?;
            self.attachments.push(Attachment {
                kind: request.kind,
                image,
                view: ImageViewHandle::NULL,
                desc: request.desc.clone(),
                offset: 0,
            });
            requirements.push(reqs);
        }

        let memory_types = &device.capabilities().memory_types;
        let mut types = Vec::with_capacity(requirements.len());
        for reqs in &requirements {
            let memory_type = find_memory_type(memory_types, reqs.memory_type_bits, MemoryProperties::DEVICE_LOCAL)
                .ok_or_else(|| Error::Unsupported("no device-local memory for attachments".to_string()))?;
            types.push(memory_type);
        }

        let order = allocation_order(&requests);
        let mut totals: Vec<(u32, u64)> = Vec::new();
        for &i in &order {
            let reqs = &requirements[i];
            match totals.iter_mut().find(|(t, _)| *t == types[i]) {
                Some((_, total)) => *total = align_up(*total, reqs.alignment) + reqs.size,
                None => totals.push((types[i], reqs.size)),
            }
        }
        let chunk_size = totals.iter().map(|(_, total)| *total).max().unwrap_or(0);
        self.pool = ImageChunkPool::new(chunk_size, totals.len());

        for &i in &order {
            let allocation = self.pool.allocate(device, &requirements[i], types[i])?;
            device.bind_image_memory(self.attachments[i].image, allocation.memory, allocation.offset)?;
            self.attachments[i].offset = allocation.offset;
            self.placement.push(self.attachments[i].kind);
        }

        for attachment in self.attachments.iter_mut() {
            attachment.view = device.create_image_view(attachment.image, &attachment.desc)?;
        }

        engine_debug!(
            "arena::attachments",
            "Created {} attachments in {} chunk(s) of {} KiB",
            self.attachments.len(),
            self.pool.chunk_count(),
            chunk_size / 1024
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    pub fn get(&self, kind: AttachmentKind) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.kind == kind)
    }

    pub fn view(&self, kind: AttachmentKind) -> Result<ImageViewHandle> {
        self.get(kind)
            .map(|a| a.view)
            .ok_or_else(|| Error::InvalidResource(format!("no {:?} attachment", kind)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter()
    }

    /// Kinds in the order their memory was placed
    pub fn placement(&self) -> &[AttachmentKind] {
        &self.placement
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for attachment in self.attachments.drain(..) {
            if !attachment.view.is_null() {
                device.destroy_image_view(attachment.view);
            }
            device.destroy_image(attachment.image);
        }
        self.pool.destroy(device);
        self.placement.clear();
    }
}

#[cfg(test)]
#[path = "attachments_tests.rs"]
mod tests;
