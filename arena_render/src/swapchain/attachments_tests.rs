//! Unit tests for attachments.rs

use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::swapchain::attachments::*;

fn config(samples: SampleCount, bloom: bool, capture: bool) -> AttachmentConfig {
    AttachmentConfig {
        render_extent: Extent2D::new(1280, 720),
        window_extent: Extent2D::new(1280, 720),
        color_format: Format::R8G8B8A8_UNORM,
        depth_format: Format::D24_UNORM_S8_UINT,
        samples,
        bloom,
        capture_format: capture.then_some(Format::R8G8B8A8_UNORM),
    }
}

// ============================================================================
// PLANNING
// ============================================================================

#[test]
fn test_minimal_plan() {
    let plan = plan_attachments(&config(SampleCount::S1, false, false));
    let kinds: Vec<AttachmentKind> = plan.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AttachmentKind::Color,
            AttachmentKind::Depth,
            AttachmentKind::ScreenMapColor,
            AttachmentKind::ScreenMapDepth,
        ]
    );
}

#[test]
fn test_msaa_plan_adds_multisampled_color() {
    let plan = plan_attachments(&config(SampleCount::S4, false, false));
    let msaa = plan.iter().find(|r| r.kind == AttachmentKind::Msaa).unwrap();
    assert_eq!(msaa.desc.samples, SampleCount::S4);
    let depth = plan.iter().find(|r| r.kind == AttachmentKind::Depth).unwrap();
    assert_eq!(depth.desc.samples, SampleCount::S4);
    let color = plan.iter().find(|r| r.kind == AttachmentKind::Color).unwrap();
    assert_eq!(color.desc.samples, SampleCount::S1);
}

#[test]
fn test_bloom_chain_halves_each_level() {
    let plan = plan_attachments(&config(SampleCount::S1, true, false));
    let bloom: Vec<&AttachmentRequest> = plan
        .iter()
        .filter(|r| matches!(r.kind, AttachmentKind::Bloom { .. }))
        .collect();
    assert_eq!(bloom.len(), BLOOM_LEVELS * 2);
    assert_eq!((bloom[0].desc.width, bloom[0].desc.height), (640, 360));
    assert_eq!((bloom[2].desc.width, bloom[2].desc.height), (320, 180));
    assert_eq!((bloom[6].desc.width, bloom[6].desc.height), (80, 45));
}

#[test]
fn test_screen_map_extent_has_floor() {
    assert_eq!(screen_map_extent(Extent2D::new(1280, 720)), Extent2D::new(80, 45));
    assert_eq!(screen_map_extent(Extent2D::new(32, 16)), Extent2D::new(4, 4));
}

#[test]
fn test_allocation_order_groups_usage_stably() {
    let plan = plan_attachments(&config(SampleCount::S4, true, true));
    let order = allocation_order(&plan);

    let usages: Vec<u32> = order.iter().map(|&i| plan[i].desc.usage.bits()).collect();
    let mut sorted = usages.clone();
    sorted.sort();
    assert_eq!(usages, sorted);

    // same-usage images keep their declaration order
    let sampled: Vec<usize> = order
        .iter()
        .copied()
        .filter(|&i| plan[i].desc.usage == ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED)
        .collect();
    let mut declared = sampled.clone();
    declared.sort();
    assert_eq!(sampled, declared);
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_create_places_all_images_in_one_chunk() {
    let mut device = MockDevice::new();
    let plan = plan_attachments(&config(SampleCount::S2, true, true));
    let count = plan.len();
    let mut set = AttachmentSet::create(&mut device, plan).unwrap();

    assert_eq!(set.iter().count(), count);
    assert_eq!(device.memory.len(), 1);
    assert!(set.iter().all(|a| !a.view.is_null()));
    assert_eq!(set.placement().len(), count);
    assert_eq!(set.placement()[0], AttachmentKind::Capture);

    set.destroy(&mut device);
    assert!(device.images.is_empty());
    assert!(device.image_views.is_empty());
    assert!(device.memory.is_empty());
}

#[test]
fn test_offsets_do_not_overlap() {
    let mut device = MockDevice::new();
    let set = AttachmentSet::create(&mut device, plan_attachments(&config(SampleCount::S4, true, false))).unwrap();

    let mut ranges: Vec<(u64, u64)> = set
        .iter()
        .map(|a| {
            let (memory, offset) = device.bound_memory[&a.image];
            assert_eq!(offset, a.offset);
            let _ = memory;
            let size = {
                let desc = &a.desc;
                desc.width as u64 * desc.height as u64 * desc.format.bytes_per_pixel() as u64 * desc.samples.count() as u64
            };
            (a.offset, a.offset + size)
        })
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0);
    }
}

#[test]
fn test_view_lookup() {
    let mut device = MockDevice::new();
    let set = AttachmentSet::create(&mut device, plan_attachments(&config(SampleCount::S1, false, false))).unwrap();
    assert!(set.view(AttachmentKind::Color).is_ok());
    assert!(set.view(AttachmentKind::Msaa).is_err());
}
