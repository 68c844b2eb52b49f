//! The fixed set of render passes and how each one is described
//!
//! Every pass has a single subpass. Passes are rebuilt together with the
//! attachments whenever the render targets are rebuilt.

use crate::device::*;
use crate::engine_debug;
use crate::error::Result;

/// Named render passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPassKind {
    /// World and entities, into the scene color attachment
    Main,
    /// Low resolution preview of the scene (used by mirrors/portals)
    ScreenMap,
    /// Bright-pass filter into the first bloom level
    BloomExtract,
    /// One direction of the blur ladder
    Blur,
    /// Bloom composite onto the scene color, then unbloomed 2D
    PostBloom,
    /// Scene color -> swapchain image with gamma/overbright
    Gamma,
    /// Same as Gamma, into a transfer-source capture image
    Capture,
}

impl RenderPassKind {
    pub const COUNT: usize = 7;

    pub const ALL: [RenderPassKind; Self::COUNT] = [
        RenderPassKind::Main,
        RenderPassKind::ScreenMap,
        RenderPassKind::BloomExtract,
        RenderPassKind::Blur,
        RenderPassKind::PostBloom,
        RenderPassKind::Gamma,
        RenderPassKind::Capture,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Formats and sample count the passes are built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassFormats {
    pub color: Format,
    pub depth: Format,
    pub samples: SampleCount,
    pub surface: Format,
    pub capture: Format,
}

fn color_attachment(format: Format, samples: SampleCount, load_op: LoadOp, store_op: StoreOp) -> AttachmentDesc {
    AttachmentDesc {
        format,
        samples,
        load_op,
        store_op,
        stencil_load_op: LoadOp::DontCare,
        stencil_store_op: StoreOp::DontCare,
        initial_layout: if load_op == LoadOp::Load { ImageLayout::ShaderReadOnly } else { ImageLayout::Undefined },
        final_layout: ImageLayout::ShaderReadOnly,
    }
}

fn depth_attachment(format: Format, samples: SampleCount) -> AttachmentDesc {
    AttachmentDesc {
        format,
        samples,
        load_op: LoadOp::Clear,
        store_op: StoreOp::DontCare,
        stencil_load_op: if format.has_stencil() { LoadOp::Clear } else { LoadOp::DontCare },
        stencil_store_op: StoreOp::DontCare,
        initial_layout: ImageLayout::Undefined,
        final_layout: ImageLayout::DepthStencilAttachment,
    }
}

/// Color output that a later pass samples
fn sampled_output_dependencies(with_depth: bool) -> Vec<SubpassDependency> {
    let mut incoming = SubpassDependency {
        direction: DependencyDirection::Incoming,
        src_stages: PipelineStages::FRAGMENT_SHADER,
        dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
        src_access: AccessFlags::SHADER_READ,
        dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
    };
    if with_depth {
        incoming.src_stages |= PipelineStages::LATE_FRAGMENT_TESTS;
        incoming.dst_stages |= PipelineStages::EARLY_FRAGMENT_TESTS;
        incoming.src_access |= AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        incoming.dst_access |= AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    vec![
        incoming,
        SubpassDependency {
            direction: DependencyDirection::Outgoing,
            src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: PipelineStages::FRAGMENT_SHADER,
            src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::SHADER_READ,
        },
    ]
}

/// Describe one render pass
pub fn describe_render_pass(kind: RenderPassKind, formats: &PassFormats) -> RenderPassDesc {
    match kind {
        RenderPassKind::Main => {
            let color_final = color_attachment(formats.color, SampleCount::S1, LoadOp::DontCare, StoreOp::Store);
            if formats.samples == SampleCount::S1 {
                RenderPassDesc {
                    name: "main",
                    attachments: vec![color_final, depth_attachment(formats.depth, SampleCount::S1)],
                    color: Some(0),
                    depth: Some(1),
                    resolve: None,
                    dependencies: sampled_output_dependencies(true),
                }
            } else {
                let mut msaa = color_attachment(formats.color, formats.samples, LoadOp::DontCare, StoreOp::DontCare);
                msaa.final_layout = ImageLayout::ColorAttachment;
                RenderPassDesc {
                    name: "main_msaa",
                    attachments: vec![msaa, depth_attachment(formats.depth, formats.samples), color_final],
                    color: Some(0),
                    depth: Some(1),
                    resolve: Some(2),
                    dependencies: sampled_output_dependencies(true),
                }
            }
        }
        RenderPassKind::ScreenMap => RenderPassDesc {
            name: "screen_map",
            attachments: vec![
                color_attachment(formats.color, SampleCount::S1, LoadOp::Clear, StoreOp::Store),
                depth_attachment(formats.depth, SampleCount::S1),
            ],
            color: Some(0),
            depth: Some(1),
            resolve: None,
            dependencies: sampled_output_dependencies(true),
        },
        RenderPassKind::BloomExtract | RenderPassKind::Blur => RenderPassDesc {
            name: if kind == RenderPassKind::Blur { "blur" } else { "bloom_extract" },
            attachments: vec![color_attachment(formats.color, SampleCount::S1, LoadOp::DontCare, StoreOp::Store)],
            color: Some(0),
            depth: None,
            resolve: None,
            dependencies: sampled_output_dependencies(false),
        },
        RenderPassKind::PostBloom => RenderPassDesc {
            name: "post_bloom",
            attachments: vec![color_attachment(formats.color, SampleCount::S1, LoadOp::Load, StoreOp::Store)],
            color: Some(0),
            depth: None,
            resolve: None,
            dependencies: sampled_output_dependencies(false),
        },
        RenderPassKind::Gamma => {
            let mut target = color_attachment(formats.surface, SampleCount::S1, LoadOp::DontCare, StoreOp::Store);
            target.final_layout = ImageLayout::PresentSrc;
            RenderPassDesc {
                name: "gamma",
                attachments: vec![target],
                color: Some(0),
                depth: None,
                resolve: None,
                dependencies: vec![
                    SubpassDependency {
                        direction: DependencyDirection::Incoming,
                        src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                        dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                        src_access: AccessFlags::empty(),
                        dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                    },
                    SubpassDependency {
                        direction: DependencyDirection::Outgoing,
                        src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                        dst_stages: PipelineStages::BOTTOM_OF_PIPE,
                        src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                        dst_access: AccessFlags::MEMORY_READ,
                    },
                ],
            }
        }
        RenderPassKind::Capture => {
            let mut target = color_attachment(formats.capture, SampleCount::S1, LoadOp::DontCare, StoreOp::Store);
            target.final_layout = ImageLayout::TransferSrc;
            RenderPassDesc {
                name: "capture",
                attachments: vec![target],
                color: Some(0),
                depth: None,
                resolve: None,
                dependencies: vec![SubpassDependency {
                    direction: DependencyDirection::Outgoing,
                    src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    dst_stages: PipelineStages::TRANSFER,
                    src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                    dst_access: AccessFlags::TRANSFER_READ,
                }],
            }
        }
    }
}

/// Render pass objects for one render-target epoch
pub struct RenderPassSet {
    passes: [RenderPassHandle; RenderPassKind::COUNT],
}

impl RenderPassSet {
    /// Set holding no passes
    pub fn empty() -> Self {
        Self { passes: [RenderPassHandle::NULL; RenderPassKind::COUNT] }
    }

    /// Create every pass in `kinds`
    pub fn create(device: &mut dyn GpuDevice, formats: &PassFormats, kinds: &[RenderPassKind]) -> Result<Self> {
        let mut set = Self::empty();
        for &kind in kinds {
            let desc = describe_render_pass(kind, formats);
            match device.create_render_pass(&desc) {
                Ok(handle) => set.passes[kind.index()] = handle,
                Err(err) => {
                    set.destroy(device);
                    return Err(err);
                }
            }
            engine_debug!("arena::render_pass", "Created render pass '{}'", desc.name);
        }
        Ok(set)
    }

    /// Handle of `kind`, `None` if that pass is not part of this epoch
    pub fn get(&self, kind: RenderPassKind) -> Option<RenderPassHandle> {
        let handle = self.passes[kind.index()];
        (!handle.is_null()).then_some(handle)
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for handle in self.passes.iter_mut() {
            if !handle.is_null() {
                device.destroy_render_pass(*handle);
                *handle = RenderPassHandle::NULL;
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
