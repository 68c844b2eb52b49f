//! Shared fixtures for unit tests

use crate::config::Config;
use crate::descriptors::DescriptorLayouts;
use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::error::Result;
use crate::pipeline::shaders::{stub_source, ShaderLibrary};
use crate::swapchain::render_targets::{RenderTargets, TargetParams};

/// Mock device with the session-wide objects render targets need
pub(crate) struct TargetFixture {
    pub device: MockDevice,
    pub context: DeviceContext,
    pub config: Config,
    pub layouts: DescriptorLayouts,
    pub sampler: SamplerHandle,
    pub shaders: ShaderLibrary,
}

impl TargetFixture {
    pub fn new(config: Config) -> Self {
        let mut device = MockDevice::new();
        let context = DeviceContext::new(&mut device, &config).unwrap();
        let layouts = DescriptorLayouts::create(&mut device).unwrap();
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
        let shaders = ShaderLibrary::load(&mut device, &stub_source()).unwrap();
        Self { device, context, config, layouts, sampler, shaders }
    }

    pub fn build_targets(&mut self) -> Result<RenderTargets> {
        let params = TargetParams {
            context: &self.context,
            config: &self.config,
            window_extent: Extent2D::new(800, 600),
            sampler_layout: self.layouts.sampler,
            sampler: self.sampler,
        };
        RenderTargets::build(&mut self.device, &params)
    }
}

/// Mock device plus a session built on it with `config`
pub(crate) fn session_with(config: &Config) -> (MockDevice, crate::backend::Session) {
    let mut device = MockDevice::new();
    let session =
        crate::backend::Session::new(&mut device, &stub_source(), config, Extent2D::new(800, 600)).unwrap();
    (device, session)
}
