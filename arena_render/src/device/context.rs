//! Device context: the chosen formats and features for one session

use crate::config::Config;
use crate::device::capabilities::{
    choose_color_format, choose_depth_format, choose_surface_format, resolve_sample_count,
};
use crate::device::{Format, GpuDevice, SampleCount, SurfaceFormat};
use crate::engine_info;
use crate::error::Result;

/// Minimum alignment of every geometry buffer push
pub const GEOMETRY_ALIGNMENT: u64 = 32;

/// Bound on every fence wait and image acquisition
pub const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

/// Decisions derived once from the device and the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceContext {
    pub surface_format: SurfaceFormat,
    pub depth_format: Format,
    pub color_format: Format,
    pub samples: SampleCount,
    /// Alignment of uniform pushes (at least `GEOMETRY_ALIGNMENT`)
    pub uniform_alignment: u64,
    /// Effective anisotropy (0 = off)
    pub anisotropy: u32,
    pub wide_lines: bool,
    pub fragment_stores: bool,
    pub depth_clamp: bool,
}

impl DeviceContext {
    pub fn new(device: &mut dyn GpuDevice, config: &Config) -> Result<Self> {
        let surface = device.surface_capabilities()?;
        let caps = device.capabilities();

        let surface_format = choose_surface_format(&surface.formats)?;
        let depth_format = choose_depth_format(&caps.depth_formats)?;
        let color_format = choose_color_format(caps, config.hdr);
        let samples = resolve_sample_count(config.msaa_samples, caps.attachment_samples());

        let anisotropy = if caps.features.sampler_anisotropy {
            config.anisotropy.min(caps.limits.max_sampler_anisotropy as u32)
        } else {
            0
        };

        let context = Self {
            surface_format,
            depth_format,
            color_format,
            samples,
            uniform_alignment: caps
                .limits
                .min_uniform_buffer_offset_alignment
                .max(GEOMETRY_ALIGNMENT)
                .next_power_of_two(),
            anisotropy,
            wide_lines: caps.features.wide_lines,
            fragment_stores: caps.features.fragment_stores_and_atomics,
            depth_clamp: caps.features.depth_clamp,
        };

        engine_info!(
            "arena::device",
            "{}: surface {:?}, depth {:?}, color {:?}, {}x MSAA",
            caps.adapter_name,
            context.surface_format.format,
            context.depth_format,
            context.color_format,
            context.samples.count()
        );
        Ok(context)
    }

    pub fn msaa(&self) -> bool {
        self.samples != SampleCount::S1
    }
}
