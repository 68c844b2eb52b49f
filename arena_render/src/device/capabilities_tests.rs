//! Unit tests for capabilities.rs

use crate::device::capabilities::*;
use crate::device::types::*;
use crate::error::Error;

// ============================================================================
// HELPERS
// ============================================================================

fn family(index: u32, graphics: bool, present: bool) -> QueueFamilyInfo {
    QueueFamilyInfo { index, graphics, present, queue_count: 1 }
}

fn adapter(name: &str, adapter_type: AdapterType) -> AdapterInfo {
    AdapterInfo {
        name: name.to_string(),
        adapter_type,
        queue_families: vec![family(0, true, true)],
        features: DeviceFeatures { fill_mode_non_solid: true, ..Default::default() },
        swapchain_extension: true,
    }
}

fn srgb(format: Format) -> SurfaceFormat {
    SurfaceFormat { format, color_space: ColorSpace::SrgbNonlinear }
}

// ============================================================================
// QUEUE FAMILY / FEATURES
// ============================================================================

#[test]
fn test_find_queue_family_needs_graphics_and_present() {
    let families = [family(0, true, false), family(1, false, true), family(2, true, true)];
    assert_eq!(find_queue_family(&families), Some(2));
    assert_eq!(find_queue_family(&families[..2]), None);
}

#[test]
fn test_required_features() {
    let mut a = adapter("gpu", AdapterType::Discrete);
    assert!(check_required_features(&a).is_ok());

    a.features.fill_mode_non_solid = false;
    assert!(matches!(check_required_features(&a), Err(Error::Unsupported(_))));

    a.features.fill_mode_non_solid = true;
    a.swapchain_extension = false;
    assert!(matches!(check_required_features(&a), Err(Error::Unsupported(_))));

    a.swapchain_extension = true;
    a.queue_families = vec![family(0, true, false)];
    assert!(matches!(check_required_features(&a), Err(Error::Unsupported(_))));
}

// ============================================================================
// DEVICE SELECTION
// ============================================================================

#[test]
fn test_select_prefers_discrete() {
    let adapters = [
        adapter("igpu", AdapterType::Integrated),
        adapter("cpu", AdapterType::Cpu),
        adapter("dgpu", AdapterType::Discrete),
    ];
    assert_eq!(select_physical_device(&adapters, None), Ok(2));
}

#[test]
fn test_select_honors_valid_index() {
    let adapters = [adapter("dgpu", AdapterType::Discrete), adapter("igpu", AdapterType::Integrated)];
    assert_eq!(select_physical_device(&adapters, Some(1)), Ok(1));
    // out of range falls back to automatic selection
    assert_eq!(select_physical_device(&adapters, Some(9)), Ok(0));
}

#[test]
fn test_select_skips_unsuitable_devices() {
    let mut broken = adapter("dgpu", AdapterType::Discrete);
    broken.features.fill_mode_non_solid = false;
    let adapters = [broken, adapter("igpu", AdapterType::Integrated)];
    assert_eq!(select_physical_device(&adapters, Some(0)), Ok(1));
}

#[test]
fn test_select_fails_without_suitable_device() {
    assert!(matches!(select_physical_device(&[], None), Err(Error::Unsupported(_))));

    let mut broken = adapter("dgpu", AdapterType::Discrete);
    broken.swapchain_extension = false;
    assert!(matches!(select_physical_device(&[broken], None), Err(Error::Unsupported(_))));
}

// ============================================================================
// FORMATS
// ============================================================================

#[test]
fn test_surface_format_prefers_unorm() {
    let formats = [srgb(Format::B8G8R8A8_SRGB), srgb(Format::R8G8B8A8_UNORM)];
    assert_eq!(choose_surface_format(&formats), Ok(srgb(Format::R8G8B8A8_UNORM)));

    let formats = [srgb(Format::R8G8B8A8_UNORM), srgb(Format::B8G8R8A8_UNORM)];
    assert_eq!(choose_surface_format(&formats), Ok(srgb(Format::B8G8R8A8_UNORM)));
}

#[test]
fn test_surface_format_fallbacks() {
    let only_srgb = [srgb(Format::B8G8R8A8_SRGB)];
    assert_eq!(choose_surface_format(&only_srgb), Ok(srgb(Format::B8G8R8A8_SRGB)));

    let undefined = [srgb(Format::Undefined)];
    assert_eq!(choose_surface_format(&undefined), Ok(srgb(Format::B8G8R8A8_UNORM)));

    assert!(choose_surface_format(&[]).is_err());
}

#[test]
fn test_depth_format_order() {
    assert_eq!(
        choose_depth_format(&[Format::D16_UNORM, Format::D32_SFLOAT_S8_UINT, Format::D24_UNORM_S8_UINT]),
        Ok(Format::D24_UNORM_S8_UINT)
    );
    assert_eq!(
        choose_depth_format(&[Format::D32_SFLOAT, Format::D16_UNORM_S8_UINT]),
        Ok(Format::D16_UNORM_S8_UINT)
    );
    assert_eq!(choose_depth_format(&[Format::D16_UNORM]), Ok(Format::D16_UNORM));
    assert!(choose_depth_format(&[]).is_err());
}

// ============================================================================
// SAMPLE COUNT
// ============================================================================

#[test]
fn test_msaa_request_is_clamped_not_upgraded() {
    let up_to_4x = SampleCountFlags::TYPE_1 | SampleCountFlags::TYPE_2 | SampleCountFlags::TYPE_4;
    assert_eq!(resolve_sample_count(2, up_to_4x), SampleCount::S2);
    assert_eq!(resolve_sample_count(8, up_to_4x), SampleCount::S4);
    assert_eq!(resolve_sample_count(3, up_to_4x), SampleCount::S2);
    assert_eq!(resolve_sample_count(0, up_to_4x), SampleCount::S1);
}

#[test]
fn test_msaa_skips_unsupported_counts() {
    let sparse = SampleCountFlags::TYPE_1 | SampleCountFlags::TYPE_4;
    assert_eq!(resolve_sample_count(2, sparse), SampleCount::S1);
    assert_eq!(resolve_sample_count(8, sparse), SampleCount::S4);
}

// ============================================================================
// MEMORY TYPES
// ============================================================================

#[test]
fn test_find_memory_type() {
    let types = [
        MemoryType { properties: MemoryProperties::DEVICE_LOCAL, heap_index: 0 },
        MemoryType {
            properties: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
            heap_index: 1,
        },
    ];
    assert_eq!(find_memory_type(&types, 0b11, MemoryProperties::DEVICE_LOCAL), Some(0));
    assert_eq!(find_memory_type(&types, 0b11, MemoryProperties::HOST_VISIBLE), Some(1));
    assert_eq!(find_memory_type(&types, 0b01, MemoryProperties::HOST_VISIBLE), None);
}
