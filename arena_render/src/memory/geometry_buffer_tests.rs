//! Unit tests for geometry_buffer.rs

use crate::device::mock_device::{MockDevice, MockEvent};
use crate::device::{DescriptorKind, DescriptorPoolDesc, GpuDevice, ShaderStages};
use crate::memory::geometry_buffer::{GeometryBuffer, GeometryBufferDesc, GeometryKind};

// ============================================================================
// HELPERS
// ============================================================================

fn create(device: &mut MockDevice, capacity: u64) -> GeometryBuffer {
    let pool = device
        .create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: 4,
            uniform_dynamic: 4,
            storage_dynamic: 0,
            image_samplers: 0,
        })
        .unwrap();
    let layout = device
        .create_descriptor_set_layout(DescriptorKind::UniformDynamic, ShaderStages::VERTEX)
        .unwrap();
    GeometryBuffer::new(
        device,
        GeometryBufferDesc {
            slot_count: 2,
            capacity,
            uniform_alignment: 64,
            uniform_range: 128,
            descriptor_pool: pool,
            uniform_layout: layout,
        },
    )
    .unwrap()
}

// ============================================================================
// PUSH
// ============================================================================

#[test]
fn test_push_aligns_to_32_bytes() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 1024);
    geometry.begin_slot(0);

    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[1; 12]).unwrap(), Some(0));
    assert_eq!(geometry.push(&mut device, GeometryKind::Index, &[2; 6]).unwrap(), Some(32));
    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[3; 4]).unwrap(), Some(64));
    assert_eq!(geometry.cursor(), 68);
}

#[test]
fn test_uniform_push_uses_device_alignment() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 1024);
    geometry.begin_slot(0);

    geometry.push(&mut device, GeometryKind::Vertex, &[0; 8]).unwrap();
    assert_eq!(geometry.push(&mut device, GeometryKind::Uniform, &[0; 16]).unwrap(), Some(64));
}

#[test]
fn test_push_writes_into_current_slot() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);

    geometry.begin_slot(1);
    geometry.push(&mut device, GeometryKind::Vertex, &[7, 8, 9]).unwrap();

    let buffer = geometry.region(1).buffer;
    assert_eq!(&device.buffers[&buffer][..3], &[7, 8, 9]);
    assert_eq!(&device.buffers[&geometry.region(0).buffer][..3], &[0, 0, 0]);
}

#[test]
fn test_each_region_has_uniform_descriptor() {
    let mut device = MockDevice::new();
    let geometry = create(&mut device, 256);
    for slot in 0..2 {
        let region = geometry.region(slot);
        assert_eq!(device.buffer_descriptors[&region.uniform_set], (region.buffer, 128));
    }
}

// ============================================================================
// OVERFLOW
// ============================================================================

#[test]
fn test_overflow_detected_before_out_of_bounds_write() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    geometry.begin_slot(0);

    assert!(geometry.push(&mut device, GeometryKind::Vertex, &[1; 200]).unwrap().is_some());
    // MockDevice rejects out-of-bounds writes, so Ok(None) proves no write happened
    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[1; 100]).unwrap(), None);
    assert!(geometry.is_overflowed());
}

#[test]
fn test_uniform_push_reserves_whole_descriptor_range() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 200);
    geometry.begin_slot(0);

    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[1; 100]).unwrap(), Some(0));
    // 64 bytes at offset 128 fit, but the 128-byte descriptor window does not
    assert_eq!(geometry.push(&mut device, GeometryKind::Uniform, &[2; 64]).unwrap(), None);
    assert!(geometry.is_overflowed());

    assert!(geometry.pending_resize().unwrap() >= 256);
    geometry.apply_resize(&mut device).unwrap();
    geometry.begin_slot(1);
    geometry.push(&mut device, GeometryKind::Vertex, &[1; 100]).unwrap();
    let offset = geometry.push(&mut device, GeometryKind::Uniform, &[2; 64]).unwrap().unwrap();
    assert!(offset + 128 <= geometry.capacity());
}

#[test]
fn test_pushes_after_overflow_are_dropped_even_if_small() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    geometry.begin_slot(0);

    geometry.push(&mut device, GeometryKind::Vertex, &[1; 200]).unwrap();
    geometry.push(&mut device, GeometryKind::Vertex, &[1; 100]).unwrap();
    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[1; 4]).unwrap(), None);
}

#[test]
fn test_resize_covers_whole_frame_demand_and_doubles() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    geometry.begin_slot(0);

    let mut total = 0u64;
    for _ in 0..20 {
        geometry.push(&mut device, GeometryKind::Vertex, &[0; 64]).unwrap();
        total += 64;
    }
    let requested = geometry.pending_resize().unwrap();
    assert!(requested >= total);
    assert!(requested >= 512);
    assert!(requested.is_power_of_two());

    assert!(geometry.apply_resize(&mut device).unwrap());
    assert_eq!(geometry.capacity(), requested);
    assert_eq!(geometry.pending_resize(), None);

    geometry.begin_slot(1);
    for _ in 0..20 {
        assert!(geometry.push(&mut device, GeometryKind::Vertex, &[0; 64]).unwrap().is_some());
    }
}

#[test]
fn test_resize_recreates_buffers_and_rebinds_descriptors() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    let old = geometry.region(0);

    geometry.begin_slot(0);
    geometry.push(&mut device, GeometryKind::Vertex, &[0; 300]).unwrap();
    geometry.apply_resize(&mut device).unwrap();

    let new = geometry.region(0);
    assert_ne!(old.buffer, new.buffer);
    assert_eq!(old.uniform_set, new.uniform_set);
    assert!(!device.buffers.contains_key(&old.buffer));
    assert_eq!(device.buffers[&new.buffer].len() as u64, geometry.capacity());
    assert_eq!(device.buffer_descriptors[&new.uniform_set].0, new.buffer);
}

#[test]
fn test_apply_resize_without_request_is_noop() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    let before = geometry.region(0).buffer;
    assert!(!geometry.apply_resize(&mut device).unwrap());
    assert_eq!(geometry.region(0).buffer, before);
}

#[test]
fn test_begin_slot_clears_overflow() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    geometry.begin_slot(0);
    geometry.push(&mut device, GeometryKind::Vertex, &[0; 512]).unwrap();
    assert!(geometry.is_overflowed());

    geometry.begin_slot(1);
    assert!(!geometry.is_overflowed());
    assert_eq!(geometry.push(&mut device, GeometryKind::Vertex, &[0; 16]).unwrap(), Some(0));
}

#[test]
fn test_failed_resize_does_not_destroy_buffers_twice() {
    let mut device = MockDevice::new();
    let mut geometry = create(&mut device, 256);
    let old = [geometry.region(0).buffer, geometry.region(1).buffer];

    geometry.begin_slot(0);
    geometry.push(&mut device, GeometryKind::Vertex, &[0; 300]).unwrap();
    device.fail_host_buffer = true;
    assert!(geometry.apply_resize(&mut device).is_err());

    geometry.destroy(&mut device);
    for buffer in old {
        let destroys = device.events.iter().filter(|e| **e == MockEvent::DestroyBuffer(buffer)).count();
        assert_eq!(destroys, 1);
    }
    assert!(!device.events.iter().any(|e| matches!(e, MockEvent::DestroyBuffer(b) if b.is_null())));
}
