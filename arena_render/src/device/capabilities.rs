//! Device capability description and the pure selection rules built on it
//!
//! The driver fills `AdapterInfo` / `DeviceCapabilities`; everything that
//! decides *which* device, queue family, format or sample count to use lives
//! here so it can be tested without a GPU.

use crate::error::{Error, Result};
use crate::device::types::*;
use crate::{engine_error, engine_info, engine_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub graphics: bool,
    /// Can present to the session's surface
    pub present: bool,
    pub queue_count: u32,
}

/// Optional device features the backend uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFeatures {
    pub fill_mode_non_solid: bool,
    pub wide_lines: bool,
    pub sampler_anisotropy: bool,
    pub fragment_stores_and_atomics: bool,
    pub depth_clamp: bool,
    pub sample_rate_shading: bool,
}

/// One physical device as enumerated by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterInfo {
    pub name: String,
    pub adapter_type: AdapterType,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub features: DeviceFeatures,
    pub swapchain_extension: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    pub max_image_dimension_2d: u32,
    pub max_sampler_anisotropy: f32,
    pub min_uniform_buffer_offset_alignment: u64,
    pub max_push_constants_size: u32,
    pub line_width_range: [f32; 2],
    pub framebuffer_color_samples: SampleCountFlags,
    pub framebuffer_depth_samples: SampleCountFlags,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_image_dimension_2d: 4096,
            max_sampler_anisotropy: 1.0,
            min_uniform_buffer_offset_alignment: 256,
            max_push_constants_size: 128,
            line_width_range: [1.0, 1.0],
            framebuffer_color_samples: SampleCountFlags::TYPE_1,
            framebuffer_depth_samples: SampleCountFlags::TYPE_1,
        }
    }
}

/// Capabilities of the logical device the driver created
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub adapter_name: String,
    pub adapter_type: AdapterType,
    /// Features that were actually enabled
    pub features: DeviceFeatures,
    pub limits: DeviceLimits,
    pub memory_types: Vec<MemoryType>,
    /// Formats usable as an optimal-tiling depth/stencil attachment
    pub depth_formats: Vec<Format>,
    /// R16G16B16A16_SFLOAT is usable as a blendable color attachment
    pub hdr_color: bool,
}

impl DeviceCapabilities {
    /// Sample counts usable for both color and depth attachments
    pub fn attachment_samples(&self) -> SampleCountFlags {
        self.limits.framebuffer_color_samples & self.limits.framebuffer_depth_samples
    }
}

// ============================================================================
// SELECTION RULES
// ============================================================================

/// First queue family that supports both graphics and present
pub fn find_queue_family(families: &[QueueFamilyInfo]) -> Option<u32> {
    families
        .iter()
        .find(|f| f.graphics && f.present && f.queue_count > 0)
        .map(|f| f.index)
}

/// Fail unless the adapter has what the backend cannot run without
pub fn check_required_features(adapter: &AdapterInfo) -> Result<()> {
    if !adapter.swapchain_extension {
        return Err(Error::Unsupported(format!(
            "{}: VK_KHR_swapchain is not supported",
            adapter.name
        )));
    }
    if !adapter.features.fill_mode_non_solid {
        return Err(Error::Unsupported(format!(
            "{}: fillModeNonSolid is not supported",
            adapter.name
        )));
    }
    if find_queue_family(&adapter.queue_families).is_none() {
        return Err(Error::Unsupported(format!(
            "{}: no queue family supports graphics and present",
            adapter.name
        )));
    }
    Ok(())
}

fn type_rank(adapter_type: AdapterType) -> u32 {
    match adapter_type {
        AdapterType::Discrete => 0,
        AdapterType::Integrated => 1,
        AdapterType::Virtual => 2,
        AdapterType::Cpu => 3,
        AdapterType::Other => 4,
    }
}

/// Pick the physical device to use
///
/// An explicit index wins when it names a suitable device. Otherwise
/// discrete GPUs are preferred over integrated ones, then anything else.
/// Unsuitable devices are skipped; if none is suitable the error of the
/// most preferred candidate is returned.
pub fn select_physical_device(adapters: &[AdapterInfo], requested: Option<usize>) -> Result<usize> {
    if adapters.is_empty() {
        return Err(Error::Unsupported("no graphics devices found".to_string()));
    }

    let mut order: Vec<usize> = (0..adapters.len()).collect();
    order.sort_by_key(|&i| type_rank(adapters[i].adapter_type));

    if let Some(index) = requested {
        if index < adapters.len() {
            order.retain(|&i| i != index);
            order.insert(0, index);
        } else {
            engine_warn!(
                "arena::device",
                "Requested device index {} is out of range (0..{}), using automatic selection",
                index,
                adapters.len()
            );
        }
    }

    let mut first_error = None;
    for &index in &order {
        match check_required_features(&adapters[index]) {
            Ok(()) => {
                engine_info!(
                    "arena::device",
                    "Selected device {}: {} ({:?})",
                    index,
                    adapters[index].name,
                    adapters[index].adapter_type
                );
                return Ok(index);
            }
            Err(err) => {
                engine_warn!("arena::device", "Skipping device {}: {}", index, err);
                first_error.get_or_insert(err);
            }
        }
    }

    let err = first_error.unwrap_or_else(|| Error::Unsupported("no suitable device".to_string()));
    engine_error!("arena::device", "No usable graphics device: {}", err);
    Err(err)
}

/// Surface format: 8-bit UNORM BGRA or RGBA in sRGB-nonlinear space when
/// available, otherwise the first format the surface reports
pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Result<SurfaceFormat> {
    let preferred = |format: Format| SurfaceFormat { format, color_space: ColorSpace::SrgbNonlinear };

    match formats {
        [] => Err(Error::Unsupported("surface reports no formats".to_string())),
        [only] if only.format == Format::Undefined => Ok(preferred(Format::B8G8R8A8_UNORM)),
        _ => {
            for wanted in [Format::B8G8R8A8_UNORM, Format::R8G8B8A8_UNORM] {
                if formats.contains(&preferred(wanted)) {
                    return Ok(preferred(wanted));
                }
            }
            Ok(formats[0])
        }
    }
}

/// Depth attachment format, stencil-capable formats first
pub fn choose_depth_format(supported: &[Format]) -> Result<Format> {
    const CANDIDATES: [Format; 5] = [
        Format::D24_UNORM_S8_UINT,
        Format::D32_SFLOAT_S8_UINT,
        Format::D16_UNORM_S8_UINT,
        Format::D32_SFLOAT,
        Format::D16_UNORM,
    ];
    CANDIDATES
        .iter()
        .copied()
        .find(|f| supported.contains(f))
        .ok_or_else(|| Error::Unsupported("no supported depth attachment format".to_string()))
}

/// Color attachment format for the scene
pub fn choose_color_format(capabilities: &DeviceCapabilities, hdr: bool) -> Format {
    if hdr && capabilities.hdr_color {
        Format::R16G16B16A16_SFLOAT
    } else {
        Format::R8G8B8A8_UNORM
    }
}

/// Largest supported sample count that does not exceed the request
pub fn resolve_sample_count(requested: u32, supported: SampleCountFlags) -> SampleCount {
    SampleCount::ALL
        .iter()
        .rev()
        .copied()
        .find(|s| s.count() <= requested.max(1) && supported.contains(s.flag()))
        .unwrap_or(SampleCount::S1)
}

/// Index of the first memory type allowed by `type_bits` with all `properties`
pub fn find_memory_type(types: &[MemoryType], type_bits: u32, properties: MemoryProperties) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .find(|(i, t)| *i < 32 && type_bits & (1 << i) != 0 && t.properties.contains(properties))
        .map(|(i, _)| i as u32)
}

#[cfg(test)]
#[path = "capabilities_tests.rs"]
mod tests;
