//! Unit tests for render_targets.rs

use crate::config::Config;
use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::swapchain::attachments::{AttachmentKind, BLOOM_LEVELS};
use crate::swapchain::render_targets::*;

// ============================================================================
// HELPERS
// ============================================================================

struct Fixture {
    device: MockDevice,
    context: DeviceContext,
    config: Config,
    layout: DescriptorSetLayoutHandle,
    sampler: SamplerHandle,
}

impl Fixture {
    fn new(config: Config) -> Self {
        let mut device = MockDevice::new();
        let context = DeviceContext::new(&mut device, &config).unwrap();
        let layout = device
            .create_descriptor_set_layout(DescriptorKind::CombinedImageSampler, ShaderStages::FRAGMENT)
            .unwrap();
        let sampler = device
            .create_sampler(&SamplerDesc {
                mag_filter: Filter::Linear,
                min_filter: Filter::Linear,
                mipmap_filter: Filter::Nearest,
                address_mode: AddressMode::ClampToEdge,
                max_anisotropy: 0,
                max_lod: 0,
            })
            .unwrap();
        Self { device, context, config, layout, sampler }
    }

    fn build(&mut self) -> crate::error::Result<RenderTargets> {
        let params = TargetParams {
            context: &self.context,
            config: &self.config,
            window_extent: Extent2D::new(800, 600),
            sampler_layout: self.layout,
            sampler: self.sampler,
        };
        RenderTargets::build(&mut self.device, &params)
    }
}

// ============================================================================
// BUILD
// ============================================================================

#[test]
fn test_default_build() {
    let mut fixture = Fixture::new(Config::default());
    let targets = fixture.build().unwrap();
    assert_eq!(targets.image_count(), 2);
    assert_eq!(targets.window_extent(), Extent2D::new(800, 600));
    assert_eq!(targets.render_extent, Extent2D::new(800, 600));
    assert_eq!(targets.framebuffers.gamma.len(), 2);
    assert_eq!(targets.rendering_finished.len(), 2);
    assert!(targets.framebuffers.bloom.is_empty());
    assert!(targets.framebuffers.capture.is_null());
    assert!(!targets.capture_via_attachment);
    assert!(!targets.post_sets.scene.is_null());
    assert_eq!(
        fixture.device.framebuffers[&targets.framebuffers.main].attachments.len(),
        2
    );
}

#[test]
fn test_msaa_main_framebuffer_has_resolve_target() {
    let mut fixture = Fixture::new(Config { msaa_samples: 4, ..Config::default() });
    let targets = fixture.build().unwrap();
    let main = &fixture.device.framebuffers[&targets.framebuffers.main];
    assert_eq!(main.attachments.len(), 3);
    assert_eq!(main.attachments[0], targets.attachments.view(AttachmentKind::Msaa).unwrap());
    assert_eq!(main.attachments[2], targets.attachments.view(AttachmentKind::Color).unwrap());
}

#[test]
fn test_bloom_chain_framebuffers_and_sets() {
    let mut fixture = Fixture::new(Config { bloom: true, ..Config::default() });
    let targets = fixture.build().unwrap();
    assert_eq!(targets.framebuffers.bloom.len(), BLOOM_LEVELS);
    assert_eq!(targets.post_sets.bloom.len(), BLOOM_LEVELS);
    assert!(!targets.framebuffers.post_bloom.is_null());
    let level1 = &fixture.device.framebuffers[&targets.framebuffers.bloom[1][0]];
    assert_eq!((level1.width, level1.height), (200, 150));
}

#[test]
fn test_render_scale_sizes_scene_targets() {
    let mut fixture = Fixture::new(Config { render_scale: 0.5, ..Config::default() });
    let targets = fixture.build().unwrap();
    assert_eq!(targets.render_extent, Extent2D::new(400, 300));
    let gamma = &fixture.device.framebuffers[&targets.framebuffers.gamma[0]];
    assert_eq!((gamma.width, gamma.height), (800, 600));
}

#[test]
fn test_surface_without_transfer_src_uses_capture_image() {
    let mut fixture = Fixture::new(Config::default());
    fixture.device.surface.supported_usage = ImageUsage::COLOR_ATTACHMENT;
    let targets = fixture.build().unwrap();
    assert!(targets.capture_via_attachment);
    assert!(!targets.framebuffers.capture.is_null());
    let capture = targets.attachments.get(AttachmentKind::Capture).unwrap();
    let (image, layout, _) = targets.readback_source(0).unwrap();
    assert_eq!(image, capture.image);
    assert_eq!(layout, ImageLayout::TransferSrc);
}

#[test]
fn test_readback_reads_swapchain_image_when_allowed() {
    let mut fixture = Fixture::new(Config::default());
    let targets = fixture.build().unwrap();
    let (image, layout, format) = targets.readback_source(1).unwrap();
    assert_eq!(image, targets.swapchain.images[1]);
    assert_eq!(layout, ImageLayout::PresentSrc);
    assert_eq!(format, Format::B8G8R8A8_UNORM);
    assert!(targets.readback_source(7).is_err());
}

// ============================================================================
// TEARDOWN AND REBUILD
// ============================================================================

#[test]
fn test_destroy_releases_everything() {
    let mut fixture = Fixture::new(Config { bloom: true, msaa_samples: 2, ..Config::default() });
    let before = fixture.device.live_objects();
    let mut targets = fixture.build().unwrap();
    targets.destroy(&mut fixture.device);
    assert_eq!(fixture.device.live_objects(), before);
    assert_eq!(fixture.device.live_swapchains(), 0);
}

#[test]
fn test_rebuild_is_stable() {
    let mut fixture = Fixture::new(Config { bloom: true, ..Config::default() });
    let mut first = fixture.build().unwrap();
    let sizes = |t: &RenderTargets| -> Vec<(AttachmentKind, u32, u32, Format)> {
        t.attachments.iter().map(|a| (a.kind, a.desc.width, a.desc.height, a.desc.format)).collect()
    };
    let first_sizes = sizes(&first);
    let first_desc = first.swapchain_desc;
    first.destroy(&mut fixture.device);

    let second = fixture.build().unwrap();
    assert_eq!(sizes(&second), first_sizes);
    assert_eq!(second.swapchain_desc, first_desc);
}

#[test]
fn test_failed_build_leaks_nothing() {
    let mut fixture = Fixture::new(Config::default());
    let before = fixture.device.live_objects();
    fixture.device.surface.supported_usage = ImageUsage::TRANSFER_SRC;
    assert!(fixture.build().is_err());
    assert_eq!(fixture.device.live_objects(), before);
}

#[test]
fn test_pass_targets_follow_built_passes() {
    let mut fixture = Fixture::new(Config::default());
    let targets = fixture.build().unwrap();
    let [main, screen_map, post_bloom] = targets.pass_targets(SampleCount::S4);
    let main = main.unwrap();
    assert_eq!(main.samples, SampleCount::S4);
    assert!(main.has_depth);
    assert_eq!(screen_map.unwrap().samples, SampleCount::S1);
    assert!(post_bloom.is_none());
}
