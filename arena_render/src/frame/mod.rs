//! Frame slots and the per-frame protocol
//!
//! `begin_frame` waits for the slot's fence, acquires a swapchain image and
//! opens the first pass; `end_frame` runs post-processing and submits;
//! `present_frame` presents, applies queued geometry regrows and surface
//! rebuilds, then rotates to the next slot.

pub mod slot;
pub mod scheduler;

pub use slot::*;

use crate::device::{PipelineHandle, Rect2D};
use crate::pipeline::{PipelinePass, VertexStream};
use crate::scene::DepthRange;

/// What the upcoming draw list needs from `begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRequest {
    /// Open the low-resolution screen-map pass first; `begin_main_pass`
    /// switches to the scene
    pub screen_map: bool,
}

/// Recording state of the frame in progress
#[derive(Debug, Clone)]
pub(crate) struct FrameRecord {
    pub slot: usize,
    /// `None` while minimized: recorded, never submitted
    pub image_index: Option<u32>,
    pub pass: Option<PipelinePass>,
    pub scene_finished: bool,
    pub pipeline: PipelineHandle,
    pub viewport: Rect2D,
    /// Range the recorded viewport uses; `None` forces the next draw to set it
    pub depth_range: Option<DepthRange>,
    pub scissor_dirty: bool,
    /// Geometry offsets of the streams bound so far
    pub streams: [Option<u64>; VertexStream::COUNT],
    pub vertex_count: u32,
    pub index_count: Option<u32>,
    pub draw_calls: u32,
    pub skipped_draws: u32,
}

impl FrameRecord {
    pub fn new(slot: usize, image_index: Option<u32>) -> Self {
        Self {
            slot,
            image_index,
            pass: None,
            scene_finished: false,
            pipeline: PipelineHandle::NULL,
            viewport: Rect2D::default(),
            depth_range: None,
            scissor_dirty: true,
            streams: [None; VertexStream::COUNT],
            vertex_count: 0,
            index_count: None,
            draw_calls: 0,
            skipped_draws: 0,
        }
    }

    /// A new render pass starts with nothing bound
    pub fn enter_pass(&mut self, pass: PipelinePass, area: Rect2D) {
        self.pass = Some(pass);
        self.pipeline = PipelineHandle::NULL;
        self.viewport = area;
        self.depth_range = None;
        self.scissor_dirty = true;
    }
}
