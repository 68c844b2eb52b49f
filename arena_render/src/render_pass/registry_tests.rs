//! Unit tests for registry.rs

use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::render_pass::registry::*;

fn formats(samples: SampleCount) -> PassFormats {
    PassFormats {
        color: Format::R8G8B8A8_UNORM,
        depth: Format::D24_UNORM_S8_UINT,
        samples,
        surface: Format::B8G8R8A8_UNORM,
        capture: Format::R8G8B8A8_UNORM,
    }
}

// ============================================================================
// DESCRIPTIONS
// ============================================================================

#[test]
fn test_main_pass_without_msaa() {
    let desc = describe_render_pass(RenderPassKind::Main, &formats(SampleCount::S1));
    assert_eq!(desc.attachments.len(), 2);
    assert_eq!(desc.resolve, None);
    assert_eq!(desc.attachments[0].final_layout, ImageLayout::ShaderReadOnly);
    assert_eq!(desc.attachments[1].load_op, LoadOp::Clear);
    assert_eq!(desc.attachments[1].stencil_load_op, LoadOp::Clear);
}

#[test]
fn test_main_pass_with_msaa_resolves() {
    let desc = describe_render_pass(RenderPassKind::Main, &formats(SampleCount::S4));
    assert_eq!(desc.attachments.len(), 3);
    assert_eq!(desc.resolve, Some(2));
    assert_eq!(desc.attachments[0].samples, SampleCount::S4);
    assert_eq!(desc.attachments[1].samples, SampleCount::S4);
    assert_eq!(desc.attachments[2].samples, SampleCount::S1);
    assert_eq!(desc.attachments[2].store_op, StoreOp::Store);
}

#[test]
fn test_screen_map_is_single_sampled() {
    let desc = describe_render_pass(RenderPassKind::ScreenMap, &formats(SampleCount::S8));
    assert!(desc.attachments.iter().all(|a| a.samples == SampleCount::S1));
}

#[test]
fn test_post_bloom_loads_scene_color() {
    let desc = describe_render_pass(RenderPassKind::PostBloom, &formats(SampleCount::S1));
    assert_eq!(desc.attachments[0].load_op, LoadOp::Load);
    assert_eq!(desc.attachments[0].initial_layout, ImageLayout::ShaderReadOnly);
    assert_eq!(desc.depth, None);
}

#[test]
fn test_gamma_and_capture_final_layouts() {
    let f = formats(SampleCount::S1);
    let gamma = describe_render_pass(RenderPassKind::Gamma, &f);
    assert_eq!(gamma.attachments[0].format, Format::B8G8R8A8_UNORM);
    assert_eq!(gamma.attachments[0].final_layout, ImageLayout::PresentSrc);

    let capture = describe_render_pass(RenderPassKind::Capture, &f);
    assert_eq!(capture.attachments[0].final_layout, ImageLayout::TransferSrc);
}

// ============================================================================
// SET
// ============================================================================

#[test]
fn test_set_creates_only_requested_passes() {
    let mut device = MockDevice::new();
    let mut set = RenderPassSet::create(
        &mut device,
        &formats(SampleCount::S1),
        &[RenderPassKind::Main, RenderPassKind::Gamma],
    )
    .unwrap();

    assert!(set.get(RenderPassKind::Main).is_some());
    assert!(set.get(RenderPassKind::Gamma).is_some());
    assert!(set.get(RenderPassKind::Blur).is_none());
    assert_eq!(device.render_passes.len(), 2);

    set.destroy(&mut device);
    assert!(device.render_passes.is_empty());
    assert!(set.get(RenderPassKind::Main).is_none());
}
