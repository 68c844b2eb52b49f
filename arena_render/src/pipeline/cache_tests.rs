//! Unit tests for cache.rs

use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::error::Error;
use crate::pipeline::builder::*;
use crate::pipeline::cache::*;
use crate::pipeline::shaders::{stub_source, ShaderLibrary};
use crate::pipeline::state::*;
use crate::render_pass::{describe_render_pass, PassFormats, RenderPassKind};

// ============================================================================
// HELPERS
// ============================================================================

struct Fixture {
    device: MockDevice,
    shaders: ShaderLibrary,
    main: RenderPassHandle,
    screen_map: RenderPassHandle,
}

impl Fixture {
    fn new() -> Self {
        let mut device = MockDevice::new();
        let shaders = ShaderLibrary::load(&mut device, &stub_source()).unwrap();
        let formats = PassFormats {
            color: Format::R8G8B8A8_UNORM,
            depth: Format::D24_UNORM_S8_UINT,
            samples: SampleCount::S1,
            surface: Format::B8G8R8A8_UNORM,
            capture: Format::R8G8B8A8_UNORM,
        };
        let main = device.create_render_pass(&describe_render_pass(RenderPassKind::Main, &formats)).unwrap();
        let screen_map = device
            .create_render_pass(&describe_render_pass(RenderPassKind::ScreenMap, &formats))
            .unwrap();
        Self { device, shaders, main, screen_map }
    }

    /// Split borrow: the device mutably, a context over the shaders
    fn parts(&mut self) -> (&mut MockDevice, PipelineContext<'_>) {
        let ctx = PipelineContext {
            shaders: &self.shaders,
            layout: PipelineLayoutHandle(500),
            targets: [
                Some(PassTarget { render_pass: self.main, samples: SampleCount::S1, has_depth: true }),
                Some(PassTarget { render_pass: self.screen_map, samples: SampleCount::S1, has_depth: true }),
                None,
            ],
            wide_lines: true,
            depth_clamp: true,
            stencil: true,
        };
        (&mut self.device, ctx)
    }
}

fn definition(variant: u32) -> PipelineDefinition {
    PipelineDefinition {
        state: StateBits::try_from(gls::SRCBLEND_ONE | gls::DSTBLEND_ONE | (variant & 1) * gls::DEPTHMASK_TRUE)
            .unwrap(),
        polygon_offset: variant & 2 != 0,
        mirror: variant & 4 != 0,
        fog_stage: variant & 8 != 0,
        ..PipelineDefinition::default()
    }
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[test]
fn test_equal_definitions_share_an_index() {
    let mut cache = PipelineCache::new();
    let a = cache.find_or_register(&definition(3)).unwrap();
    let b = cache.find_or_register(&definition(3)).unwrap();
    assert_eq!(a, b);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_distinct_definitions_get_distinct_indices() {
    let mut cache = PipelineCache::new();
    let indices: Vec<PipelineIndex> = (0..16).map(|v| cache.find_or_register(&definition(v)).unwrap()).collect();
    for (i, a) in indices.iter().enumerate() {
        for b in &indices[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_registration_compiles_nothing() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let index = cache.find_or_register(&definition(0)).unwrap();
    assert_eq!(fixture.device.counters.pipelines_created, 0);
    assert_eq!(cache.handle(index, PipelinePass::Main), None);
    let (device, ctx) = fixture.parts();
    cache.resolve(device, &ctx, index, PipelinePass::Main).unwrap();
    assert!(cache.handle(index, PipelinePass::Main).is_some());
}

#[test]
fn test_full_table_is_fatal() {
    let mut cache = PipelineCache::with_capacity(2);
    cache.find_or_register(&definition(0)).unwrap();
    cache.find_or_register(&definition(1)).unwrap();
    assert!(matches!(cache.find_or_register(&definition(2)), Err(Error::CapacityExceeded(_))));
    // Existing definitions still resolve
    assert_eq!(cache.find_or_register(&definition(1)).unwrap(), PipelineIndex(1));
}

// ============================================================================
// COMPILATION
// ============================================================================

#[test]
fn test_second_resolve_hits_the_cache() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let index = cache.find_or_register(&definition(1)).unwrap();
    let (device, ctx) = fixture.parts();
    let first = cache.resolve(device, &ctx, index, PipelinePass::Main).unwrap();
    let second = cache.resolve(device, &ctx, index, PipelinePass::Main).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.compiled_count(), 1);
    assert_eq!(fixture.device.counters.pipelines_created, 1);
}

#[test]
fn test_each_pass_compiles_separately() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let index = cache.find_or_register(&definition(0)).unwrap();
    let (device, ctx) = fixture.parts();
    let main = cache.resolve(device, &ctx, index, PipelinePass::Main).unwrap();
    let map = cache.resolve(device, &ctx, index, PipelinePass::ScreenMap).unwrap();
    assert_ne!(main, map);
    assert_eq!(cache.compiled_count(), 2);
    assert_eq!(fixture.device.pipelines[&map].render_pass, fixture.screen_map);
}

#[test]
fn test_compile_failure_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.device.fail_pipeline_compile = true;
    let mut cache = PipelineCache::new();
    let index = cache.find_or_register(&definition(0)).unwrap();
    let (device, ctx) = fixture.parts();
    assert!(matches!(
        cache.resolve(device, &ctx, index, PipelinePass::Main),
        Err(Error::BackendError(_))
    ));
    assert_eq!(cache.compiled_count(), 0);
}

#[test]
fn test_unknown_index_is_invalid() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let (device, ctx) = fixture.parts();
    assert!(matches!(
        cache.resolve(device, &ctx, PipelineIndex(9), PipelinePass::Main),
        Err(Error::InvalidResource(_))
    ));
}

// ============================================================================
// TIERS AND REBUILDS
// ============================================================================

#[test]
fn test_eager_entries_compile_immediately() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let (device, ctx) = fixture.parts();
    let index = cache.register_eager(device, &ctx, &definition(5)).unwrap();
    assert!(cache.handle(index, PipelinePass::Main).is_some());
    assert!(cache.handle(index, PipelinePass::ScreenMap).is_none());
}

#[test]
fn test_destroy_handles_keeps_definitions() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let eager;
    let lazy;
    {
        let (device, ctx) = fixture.parts();
        eager = cache.register_eager(device, &ctx, &definition(0)).unwrap();
        lazy = cache.find_or_register(&definition(1)).unwrap();
        cache.resolve(device, &ctx, lazy, PipelinePass::Main).unwrap();
    }
    cache.destroy_handles(&mut fixture.device);
    assert!(fixture.device.pipelines.is_empty());
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.find_or_register(&definition(1)).unwrap(), lazy);

    let (device, ctx) = fixture.parts();
    cache.compile_eager(device, &ctx).unwrap();
    assert!(cache.handle(eager, PipelinePass::Main).is_some());
    assert!(cache.handle(lazy, PipelinePass::Main).is_none());
}

#[test]
fn test_release_world_keeps_persistent_tier() {
    let mut fixture = Fixture::new();
    let mut cache = PipelineCache::new();
    let builtin = cache.find_or_register(&definition(0)).unwrap();
    cache.mark_world_base();
    let world = cache.find_or_register(&definition(1)).unwrap();
    {
        let (device, ctx) = fixture.parts();
        cache.resolve(device, &ctx, world, PipelinePass::Main).unwrap();
    }
    cache.release_world(&mut fixture.device);
    assert_eq!(cache.len(), 1);
    assert_eq!(fixture.device.counters.pipelines_destroyed, 1);
    assert_eq!(cache.find_or_register(&definition(0)).unwrap(), builtin);
    // The world definition registers again at the first free index
    assert_eq!(cache.find_or_register(&definition(1)).unwrap(), PipelineIndex(1));
}
