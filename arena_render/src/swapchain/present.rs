//! Swapchain parameter selection: present mode, image count and extent

use crate::config::PresentModePreference;
use crate::device::{Extent2D, ImageUsage, PresentMode, SurfaceCapabilities, SurfaceFormat, SwapchainDesc};
use crate::error::{Error, Result};

/// Lowest-latency mode first
const PRESENT_MODE_ORDER: [PresentMode; 4] = [
    PresentMode::Immediate,
    PresentMode::Mailbox,
    PresentMode::FifoRelaxed,
    PresentMode::Fifo,
];

/// Fifo is always available, so it is the final fallback
pub fn choose_present_mode(available: &[PresentMode], preference: PresentModePreference) -> PresentMode {
    match preference {
        PresentModePreference::VsyncInterval(interval) if interval > 0 => PresentMode::Fifo,
        _ => PRESENT_MODE_ORDER
            .iter()
            .copied()
            .find(|mode| available.contains(mode))
            .unwrap_or(PresentMode::Fifo),
    }
}

/// `max(2, min_image_count)`, or `max(3, ..)` for fifo on a surface with no
/// image count limit, clamped to the surface maximum when there is one
pub fn choose_image_count(caps: &SurfaceCapabilities, mode: PresentMode) -> u32 {
    let floor = if mode == PresentMode::Fifo && caps.max_image_count == 0 { 3 } else { 2 };
    let count = caps.min_image_count.max(floor);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Surface extent, or the window size clamped to the surface limits when
/// the surface lets the swapchain decide
pub fn choose_extent(caps: &SurfaceCapabilities, window: Extent2D) -> Extent2D {
    match caps.current_extent {
        Some(extent) => extent,
        None => Extent2D::new(
            window.width.clamp(caps.min_extent.width, caps.max_extent.width),
            window.height.clamp(caps.min_extent.height, caps.max_extent.height),
        ),
    }
}

/// Full swapchain description for the current surface state
pub fn describe_swapchain(
    caps: &SurfaceCapabilities,
    format: SurfaceFormat,
    window: Extent2D,
    preference: PresentModePreference,
) -> Result<SwapchainDesc> {
    if !caps.supported_usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        return Err(Error::Unsupported(
            "surface images cannot be used as color attachments".to_string(),
        ));
    }
    let present_mode = choose_present_mode(&caps.present_modes, preference);
    let mut usage = ImageUsage::COLOR_ATTACHMENT;
    if caps.supported_usage.contains(ImageUsage::TRANSFER_SRC) {
        usage |= ImageUsage::TRANSFER_SRC;
    }
    Ok(SwapchainDesc {
        image_count: choose_image_count(caps, present_mode),
        format,
        extent: choose_extent(caps, window),
        present_mode,
        usage,
    })
}

#[cfg(test)]
#[path = "present_tests.rs"]
mod tests;
