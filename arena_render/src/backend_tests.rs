//! Unit tests for backend.rs and the frame protocol

use glam::Vec4;

use crate::backend::*;
use crate::config::Config;
use crate::device::mock_device::{MockDevice, MockEvent};
use crate::device::*;
use crate::draw::VertexData;
use crate::error::Error;
use crate::frame::FrameRequest;
use crate::pipeline::*;
use crate::pipeline::shaders::stub_source;
use crate::render_pass::RenderPassKind;
use crate::scene::DepthRange;
use crate::texture::TextureDesc;

fn backend(config: &Config) -> Backend<MockDevice> {
    Backend::init(MockDevice::new(), Box::new(stub_source()), config, Extent2D::new(800, 600)).unwrap()
}

fn run_frame(backend: &mut Backend<MockDevice>) {
    backend.begin_frame(FrameRequest::default()).unwrap();
    backend.clear_color([0.0, 0.0, 0.0, 1.0]).unwrap();
    backend.end_frame().unwrap();
    backend.present_frame().unwrap();
}

fn quad_draw(backend: &mut Backend<MockDevice>, positions: &[Vec4]) -> bool {
    let debug = backend.builtins().unwrap().debug_color;
    backend.bind_pipeline(debug).unwrap();
    let data = VertexData { positions: Some(positions), ..VertexData::default() };
    let bound = backend.bind_geometry(&data).unwrap();
    let drawn = backend.draw_geometry(DepthRange::Normal, false).unwrap();
    bound && drawn
}

// ============================================================================
// INIT AND SHUTDOWN
// ============================================================================

#[test]
fn test_msaa_request_is_clamped_to_device() {
    let two = backend(&Config { msaa_samples: 2, ..Config::default() });
    assert_eq!(two.context().unwrap().samples, SampleCount::S2);
    let eight = backend(&Config { msaa_samples: 8, ..Config::default() });
    assert_eq!(eight.context().unwrap().samples, SampleCount::S4);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut backend = backend(&Config { bloom: true, msaa_samples: 4, ..Config::default() });
    run_frame(&mut backend);
    backend.shutdown();
    assert!(!backend.is_initialized());
    assert_eq!(backend.device().live_objects(), 0);

    backend.shutdown();
    assert_eq!(backend.device().live_objects(), 0);
    assert!(matches!(backend.begin_frame(FrameRequest::default()), Err(Error::InvalidResource(_))));
}

#[test]
fn test_failed_init_leaves_nothing_behind() {
    let mut device = MockDevice::new();
    device.fail_pipeline_compile = true;
    let result = Backend::init(device, Box::new(stub_source()), &Config::default(), Extent2D::new(800, 600));
    assert!(result.is_err());
}

#[test]
fn test_reinitialize_applies_new_options() {
    let mut backend = backend(&Config::default());
    run_frame(&mut backend);
    backend.reinitialize(&Config { msaa_samples: 4, ..Config::default() }).unwrap();
    assert_eq!(backend.context().unwrap().samples, SampleCount::S4);
    assert_eq!(backend.stats().frames, 0);
    run_frame(&mut backend);
    assert_eq!(backend.stats().frames, 1);
}

#[test]
fn test_white_image_is_permanent() {
    let mut backend = backend(&Config::default());
    let white = backend.white_image().unwrap();
    let desc = backend.texture_desc(white).unwrap();
    assert_eq!((desc.width, desc.height), (8, 8));
    assert!(matches!(backend.release_image(white), Err(Error::InvalidResource(_))));

    backend.begin_world().unwrap();
    backend.release_world().unwrap();
    assert!(backend.texture_desc(white).is_some());
}

// ============================================================================
// FRAMES
// ============================================================================

#[test]
fn test_frame_submits_and_presents() {
    let mut backend = backend(&Config::default());
    let submits = backend.device().counters.submits;
    run_frame(&mut backend);

    let device = backend.device();
    assert_eq!(device.counters.submits, submits + 1);
    assert_eq!(device.counters.presents, 1);
    assert!(matches!(device.events.last(), Some(MockEvent::Present { image_index: 0, .. })));
    assert_eq!(backend.stats().frames, 1);
}

#[test]
fn test_begin_frame_twice_fails() {
    let mut backend = backend(&Config::default());
    backend.begin_frame(FrameRequest::default()).unwrap();
    assert!(matches!(backend.begin_frame(FrameRequest::default()), Err(Error::InvalidResource(_))));
    assert!(matches!(backend.present_frame(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_slot_reuse_waits_for_fence() {
    let mut backend = backend(&Config::default());
    run_frame(&mut backend);
    run_frame(&mut backend);
    backend.begin_frame(FrameRequest::default()).unwrap();

    let session = backend.session.as_ref().unwrap();
    let slot = &session.slots[0];
    let events = &backend.device().events;
    let wait = events.iter().rposition(|e| *e == MockEvent::WaitFence(slot.fence)).unwrap();
    let begin = events.iter().rposition(|e| *e == MockEvent::BeginCommandBuffer(slot.cmd)).unwrap();
    assert!(wait < begin);
    // the fence stays signaled until the submission
    assert!(!events[wait..].contains(&MockEvent::ResetFence(slot.fence)));
}

#[test]
fn test_fence_timeout_is_fatal() {
    let mut backend = backend(&Config::default());
    backend.device_mut().fence_script.push_back(FenceStatus::Timeout);
    assert!(matches!(backend.begin_frame(FrameRequest::default()), Err(Error::Timeout(_))));
}

#[test]
fn test_minimized_frames_are_not_submitted() {
    let mut backend = backend(&Config::default());
    backend.resize(0, 0);
    let submits = backend.device().counters.submits;
    run_frame(&mut backend);
    run_frame(&mut backend);

    let device = backend.device();
    assert_eq!(device.counters.submits, submits);
    assert_eq!(device.counters.presents, 0);
    assert_eq!(device.counters.acquires, 0);

    backend.resize(800, 600);
    run_frame(&mut backend);
    assert_eq!(backend.device().counters.presents, 1);
    assert_eq!(backend.device().counters.swapchains_created, 1);
}

#[test]
fn test_stale_present_while_minimized_waits_for_a_window_size() {
    let mut backend = backend(&Config::default());
    let swapchains = backend.device().counters.swapchains_created;

    backend.begin_frame(FrameRequest::default()).unwrap();
    backend.clear_color([0.0, 0.0, 0.0, 1.0]).unwrap();
    backend.end_frame().unwrap();
    backend.device_mut().surface.current_extent = Some(Extent2D::new(0, 0));
    backend.device_mut().present_script.push_back(PresentOutcome::OutOfDate);
    backend.resize(0, 0);
    backend.present_frame().unwrap();

    run_frame(&mut backend);
    backend.restart().unwrap();
    assert_eq!(backend.device().counters.swapchains_created, swapchains);
    assert_eq!(backend.stats().restarts, 0);

    backend.device_mut().surface.current_extent = Some(Extent2D::new(640, 480));
    backend.resize(640, 480);
    run_frame(&mut backend);
    assert_eq!(backend.device().counters.swapchains_created, swapchains + 1);
    assert_eq!(backend.stats().restarts, 1);
    assert_eq!(backend.window_extent(), Extent2D::new(640, 480));
}

#[test]
fn test_minimize_and_restore_at_same_size_still_rebuilds_stale_surface() {
    let mut backend = backend(&Config::default());
    backend.begin_frame(FrameRequest::default()).unwrap();
    backend.clear_color([0.0, 0.0, 0.0, 1.0]).unwrap();
    backend.end_frame().unwrap();
    backend.device_mut().present_script.push_back(PresentOutcome::Suboptimal);
    backend.resize(0, 0);
    backend.present_frame().unwrap();
    assert_eq!(backend.stats().restarts, 0);

    backend.resize(800, 600);
    run_frame(&mut backend);
    assert_eq!(backend.stats().restarts, 1);
}

#[test]
fn test_resize_rebuilds_before_next_frame() {
    let mut backend = backend(&Config::default());
    run_frame(&mut backend);
    backend.device_mut().surface.current_extent = Some(Extent2D::new(1024, 768));
    backend.resize(1024, 768);
    run_frame(&mut backend);
    assert_eq!(backend.window_extent(), Extent2D::new(1024, 768));
    assert_eq!(backend.render_extent(), Extent2D::new(1024, 768));
    assert_eq!(backend.stats().restarts, 1);
}

#[test]
fn test_screen_map_pass_comes_first() {
    let mut backend = backend(&Config::default());
    backend.begin_frame(FrameRequest { screen_map: true }).unwrap();
    backend.begin_main_pass().unwrap();
    backend.begin_main_pass().unwrap();
    backend.end_frame().unwrap();

    let session = backend.session.as_ref().unwrap();
    let passes = &session.targets.passes;
    let begun: Vec<RenderPassHandle> = backend
        .device()
        .recorded(session.slots[0].cmd)
        .iter()
        .filter_map(|c| match c {
            Command::BeginRenderPass { render_pass, area, .. } => {
                if Some(*render_pass) == passes.get(RenderPassKind::ScreenMap) {
                    assert_eq!((area.width, area.height), (50, 37));
                }
                Some(*render_pass)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        begun,
        vec![
            passes.get(RenderPassKind::ScreenMap).unwrap(),
            passes.get(RenderPassKind::Main).unwrap(),
            passes.get(RenderPassKind::Gamma).unwrap(),
        ]
    );
}

// ============================================================================
// SURFACE LOSS
// ============================================================================

#[test]
fn test_out_of_date_acquire_rebuilds_once() {
    let mut backend = backend(&Config::default());
    backend.device_mut().acquire_script.push_back(AcquireOutcome::OutOfDate);
    run_frame(&mut backend);
    assert_eq!(backend.device().counters.swapchains_created, 2);
    assert_eq!(backend.device().live_swapchains(), 1);
    assert_eq!(backend.stats().restarts, 1);
}

#[test]
fn test_persistent_out_of_date_is_an_error() {
    let mut backend = backend(&Config::default());
    backend.device_mut().acquire_script.extend([AcquireOutcome::OutOfDate, AcquireOutcome::OutOfDate]);
    assert!(matches!(backend.begin_frame(FrameRequest::default()), Err(Error::BackendError(_))));
}

#[test]
fn test_suboptimal_present_rebuilds_after_presenting() {
    let mut backend = backend(&Config::default());
    backend.device_mut().present_script.push_back(PresentOutcome::OutOfDate);
    run_frame(&mut backend);
    assert_eq!(backend.device().counters.presents, 1);
    assert_eq!(backend.device().counters.swapchains_created, 2);
    run_frame(&mut backend);
    assert_eq!(backend.stats().restarts, 1);
}

#[test]
fn test_device_lost_on_present_is_not_fatal() {
    let mut backend = backend(&Config::default());
    backend.device_mut().present_script.push_back(PresentOutcome::DeviceLost);
    run_frame(&mut backend);
    run_frame(&mut backend);
    assert_eq!(backend.stats().frames, 2);
}

#[test]
fn test_device_lost_on_acquire_is_fatal() {
    let mut backend = backend(&Config::default());
    backend.device_mut().acquire_script.push_back(AcquireOutcome::DeviceLost);
    assert!(matches!(backend.begin_frame(FrameRequest::default()), Err(Error::DeviceLost)));
}

#[test]
fn test_restart_is_repeatable() {
    let mut backend = backend(&Config { msaa_samples: 4, bloom: true, ..Config::default() });
    let snapshot = |backend: &Backend<MockDevice>| {
        let session = backend.session.as_ref().unwrap();
        let attachments: Vec<ImageDesc> = session.targets.attachments.iter().map(|a| a.desc.clone()).collect();
        (session.targets.swapchain_desc, attachments, session.post.pipeline_count())
    };
    let before = snapshot(&backend);
    backend.restart().unwrap();
    backend.restart().unwrap();
    assert_eq!(snapshot(&backend), before);
    run_frame(&mut backend);
    assert_eq!(backend.device().live_swapchains(), 1);
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[test]
fn test_overflow_regrows_for_next_frame() {
    let mut backend = backend(&Config { geometry_buffer_size: 64 * 1024, ..Config::default() });
    let big = vec![Vec4::ONE; 5000];

    backend.begin_frame(FrameRequest::default()).unwrap();
    assert!(!quad_draw(&mut backend, &big));
    backend.end_frame().unwrap();
    assert_eq!(backend.stats().skipped_draws, 1);
    backend.present_frame().unwrap();

    let stats = backend.stats();
    assert_eq!(stats.geometry_regrows, 1);
    assert!(stats.geometry_capacity >= 128 * 1024);

    backend.begin_frame(FrameRequest::default()).unwrap();
    assert!(quad_draw(&mut backend, &big));
    backend.end_frame().unwrap();
    assert_eq!(backend.stats().draw_calls, 1);
    assert_eq!(backend.stats().skipped_draws, 0);
}

// ============================================================================
// PIPELINES
// ============================================================================

#[test]
fn test_pipeline_registration_is_idempotent() {
    let mut backend = backend(&Config::default());
    let def = PipelineDefinition { cull: CullType::TwoSided, ..PipelineDefinition::default() };
    let first = backend.register_pipeline_now(&def).unwrap();
    let created = backend.device().counters.pipelines_created;
    let second = backend.register_pipeline_now(&def).unwrap();
    assert_eq!(first, second);
    assert_eq!(backend.register_pipeline(&def).unwrap(), first);
    assert_eq!(backend.device().counters.pipelines_created, created);
}

#[test]
fn test_world_release_drops_world_resources() {
    let mut backend = backend(&Config::default());
    let persistent = backend.stats();
    let pipelines_before = backend.session.as_ref().unwrap().pipelines.len();

    backend.begin_world().unwrap();
    backend.create_image(TextureDesc::new("textures/base/wall", 64, 64)).unwrap();
    backend
        .register_pipeline_now(&PipelineDefinition { mirror: true, ..PipelineDefinition::default() })
        .unwrap();
    assert_eq!(backend.stats().textures, persistent.textures + 1);

    backend.release_world().unwrap();
    assert_eq!(backend.stats().textures, persistent.textures);
    assert_eq!(backend.session.as_ref().unwrap().pipelines.len(), pipelines_before);
    run_frame(&mut backend);
}

#[test]
fn test_release_world_while_recording_fails() {
    let mut backend = backend(&Config::default());
    backend.begin_world().unwrap();
    backend.begin_frame(FrameRequest::default()).unwrap();
    assert!(matches!(backend.release_world(), Err(Error::InvalidResource(_))));
}

// ============================================================================
// POST-PROCESS AND CAPTURE
// ============================================================================

#[test]
fn test_bloom_runs_between_scene_and_gamma() {
    let mut backend = backend(&Config { bloom: true, ..Config::default() });
    backend.begin_frame(FrameRequest::default()).unwrap();
    backend.finish_scene().unwrap();
    backend.clear_color([0.0; 4]).unwrap();
    backend.end_frame().unwrap();

    let session = backend.session.as_ref().unwrap();
    let passes = &session.targets.passes;
    let commands = backend.device().recorded(session.slots[0].cmd);
    let begun: Vec<RenderPassHandle> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginRenderPass { render_pass, .. } => Some(*render_pass),
            _ => None,
        })
        .collect();
    assert_eq!(begun.first(), passes.get(RenderPassKind::Main).as_ref());
    assert_eq!(begun.iter().filter(|p| Some(**p) == passes.get(RenderPassKind::Blur)).count(), 8);
    assert_eq!(begun[begun.len() - 2], passes.get(RenderPassKind::PostBloom).unwrap());
    assert_eq!(begun.last(), passes.get(RenderPassKind::Gamma).as_ref());
}

#[test]
fn test_read_pixels_returns_window_image() {
    let mut backend = backend(&Config::default());
    assert!(matches!(backend.read_pixels(), Err(Error::InvalidResource(_))));
    run_frame(&mut backend);

    let shot = backend.read_pixels().unwrap();
    assert_eq!((shot.width, shot.height), (800, 600));
    assert_eq!(shot.pixels.len(), 800 * 600 * 4);
    // the swapchain is BGRA; channels come back in RGBA order
    assert_eq!(&shot.pixels[4..8], &[0x80, 0, 1, 0xFF]);
}

#[test]
fn test_stats_summary() {
    let mut backend = backend(&Config::default());
    run_frame(&mut backend);
    let stats = backend.stats();
    assert!(stats.pipelines_compiled > 0);
    assert_eq!(stats.textures, 1);
    assert!(stats.to_string().starts_with("frame 1:"));
}
