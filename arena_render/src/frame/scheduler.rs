//! Frame protocol over the session: begin, passes, end, present, restart

use crate::backend::{no_frame, pipeline_context, Session};
use crate::descriptors::DescriptorSlot;
use crate::device::*;
use crate::error::{Error, Result};
use crate::frame::{FrameRecord, FrameRequest, FrameState};
use crate::pipeline::{PostProcess, PipelinePass};
use crate::render_pass::RenderPassKind;
use crate::swapchain::{screen_map_extent, RenderTargets};
use crate::{engine_debug, engine_info, engine_warn};

impl Session {
    /// Record a new window size. The rebuild waits for the next frame.
    pub fn resize(&mut self, extent: Extent2D) {
        self.window_extent = extent;
        self.minimized = extent.is_empty();
        if !self.minimized && extent != self.targets.window_extent() {
            self.resize_pending = true;
        }
    }

    pub fn begin_frame(&mut self, device: &mut dyn GpuDevice, request: FrameRequest) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidResource("begin_frame called twice".to_string()));
        }
        if !self.minimized && (self.resize_pending || self.restart_after_present) {
            self.restart(device)?;
        }

        let slot_index = self.current_slot;
        self.slots[slot_index].wait(device)?;

        let image_index = if self.minimized { None } else { Some(self.acquire(device)?) };

        let slot = &mut self.slots[slot_index];
        device.begin_command_buffer(slot.cmd)?;
        slot.state = FrameState::Recording;

        self.geometry.begin_slot(slot_index);
        self.descriptors.reset();
        self.descriptors.set(DescriptorSlot::Uniform, self.geometry.current().uniform_set);
        self.descriptors.set(DescriptorSlot::Storage, self.flares.set);

        let mut frame = FrameRecord::new(slot_index, image_index);
        let pass = if request.screen_map { PipelinePass::ScreenMap } else { PipelinePass::Main };
        self.begin_pass(device, &mut frame, pass)?;
        self.frame = Some(frame);
        Ok(())
    }

    /// Acquire the next image, rebuilding once when the surface went stale
    fn acquire(&mut self, device: &mut dyn GpuDevice) -> Result<u32> {
        let slot = self.current_slot;
        self.slots[slot].state = FrameState::Acquiring;
        let mut rebuilt = false;
        loop {
            let outcome = device.acquire_next_image(
                self.targets.swapchain.swapchain,
                self.slots[slot].image_acquired,
                FENCE_TIMEOUT_NS,
            )?;
            match outcome {
                AcquireOutcome::Acquired { index, suboptimal } => {
                    if suboptimal {
                        self.restart_after_present = true;
                    }
                    return Ok(index);
                }
                AcquireOutcome::OutOfDate if !rebuilt => {
                    engine_warn!("arena::frame", "Swapchain out of date on acquire, rebuilding");
                    self.restart(device)?;
                    rebuilt = true;
                }
                AcquireOutcome::OutOfDate => {
                    return Err(Error::BackendError("swapchain still out of date after rebuild".to_string()));
                }
                AcquireOutcome::Timeout => {
                    return Err(Error::Timeout(format!(
                        "no swapchain image after {} ms",
                        FENCE_TIMEOUT_NS / 1_000_000
                    )));
                }
                AcquireOutcome::DeviceLost => return Err(Error::DeviceLost),
            }
        }
    }

    fn begin_pass(&mut self, device: &mut dyn GpuDevice, frame: &mut FrameRecord, pass: PipelinePass) -> Result<()> {
        let cmd = self.cmd(frame);
        let (kind, framebuffer, extent) = match pass {
            PipelinePass::Main => (RenderPassKind::Main, self.targets.framebuffers.main, self.targets.render_extent),
            PipelinePass::ScreenMap => (
                RenderPassKind::ScreenMap,
                self.targets.framebuffers.screen_map,
                screen_map_extent(self.targets.render_extent),
            ),
            PipelinePass::PostBloom => (
                RenderPassKind::PostBloom,
                self.targets.framebuffers.post_bloom,
                self.targets.render_extent,
            ),
        };
        let render_pass = self
            .targets
            .passes
            .get(kind)
            .ok_or_else(|| Error::InvalidResource(format!("render pass {:?} not built", kind)))?;

        let color = ClearValue::Color([0.0, 0.0, 0.0, 1.0]);
        let depth = ClearValue::DepthStencil { depth: 1.0, stencil: 0 };
        let clear_values = match pass {
            PipelinePass::Main if self.context.msaa() => vec![color, depth, color],
            PipelinePass::Main | PipelinePass::ScreenMap => vec![color, depth],
            PipelinePass::PostBloom => Vec::new(),
        };
        let area = Rect2D::from_extent(extent);
        device.record(cmd, &Command::BeginRenderPass { render_pass, framebuffer, area, clear_values })?;
        frame.enter_pass(pass, area);
        Ok(())
    }

    fn end_pass(&mut self, device: &mut dyn GpuDevice, frame: &mut FrameRecord) -> Result<()> {
        if frame.pass.take().is_some() {
            device.record(self.cmd(frame), &Command::EndRenderPass)?;
        }
        Ok(())
    }

    /// Take the frame out of the session for a call that needs both
    fn with_frame<T>(
        &mut self,
        device: &mut dyn GpuDevice,
        f: impl FnOnce(&mut Self, &mut dyn GpuDevice, &mut FrameRecord) -> Result<T>,
    ) -> Result<T> {
        let mut frame = self.frame.take().ok_or_else(no_frame)?;
        let result = f(self, device, &mut frame);
        self.frame = Some(frame);
        result
    }

    pub fn begin_main_pass(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.with_frame(device, |session, device, frame| {
            match frame.pass {
                Some(PipelinePass::Main) => return Ok(()),
                Some(PipelinePass::PostBloom) => {
                    return Err(Error::InvalidResource("scene already finished".to_string()));
                }
                _ => {}
            }
            session.end_pass(device, frame)?;
            session.begin_pass(device, frame, PipelinePass::Main)
        })
    }

    pub fn finish_scene(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.with_frame(device, |session, device, frame| session.finish_scene_in(device, frame))
    }

    fn finish_scene_in(&mut self, device: &mut dyn GpuDevice, frame: &mut FrameRecord) -> Result<()> {
        if frame.scene_finished || !self.targets.bloom {
            return Ok(());
        }
        if frame.pass != Some(PipelinePass::Main) {
            self.end_pass(device, frame)?;
            self.begin_pass(device, frame, PipelinePass::Main)?;
        }
        self.end_pass(device, frame)?;

        let cmd = self.cmd(frame);
        self.post.record_bloom(device, cmd, self.layouts.post, &self.targets)?;
        self.begin_pass(device, frame, PipelinePass::PostBloom)?;
        self.post.record_bloom_composite(device, cmd, self.layouts.post, &self.targets)?;
        // the composite bound sets through the post layout
        self.descriptors.invalidate();
        frame.scene_finished = true;
        Ok(())
    }

    pub fn end_frame(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        let mut frame = self.frame.take().ok_or_else(no_frame)?;
        let result = self.end_frame_in(device, &mut frame);
        if result.is_err() {
            self.slots[frame.slot].state = FrameState::Idle;
        }
        result
    }

    fn end_frame_in(&mut self, device: &mut dyn GpuDevice, frame: &mut FrameRecord) -> Result<()> {
        if frame.pass == Some(PipelinePass::ScreenMap) {
            self.end_pass(device, frame)?;
            self.begin_pass(device, frame, PipelinePass::Main)?;
        }
        self.finish_scene_in(device, frame)?;
        self.end_pass(device, frame)?;

        let cmd = self.cmd(frame);
        if let Some(image_index) = frame.image_index {
            self.post.record_gamma(device, cmd, self.layouts.post, &self.targets, image_index)?;
            if self.targets.capture_via_attachment {
                self.post.record_capture(device, cmd, self.layouts.post, &self.targets)?;
            }
        }
        device.end_command_buffer(cmd)?;

        let slot = &mut self.slots[frame.slot];
        if let Some(image_index) = frame.image_index {
            let rendering_finished = self
                .targets
                .rendering_finished
                .get(image_index as usize)
                .copied()
                .ok_or_else(|| Error::InvalidResource(format!("no semaphore for image {}", image_index)))?;
            device.reset_fence(slot.fence)?;
            device.submit(
                cmd,
                &SubmitSync {
                    wait: Some((slot.image_acquired, PipelineStages::COLOR_ATTACHMENT_OUTPUT)),
                    signal: Some(rendering_finished),
                    fence: Some(slot.fence),
                },
            )?;
            slot.state = FrameState::Submitted;
            self.pending_present = Some(image_index);
        } else {
            slot.state = FrameState::Idle;
        }

        self.stats.frames += 1;
        self.stats.draw_calls = frame.draw_calls;
        self.stats.skipped_draws = frame.skipped_draws;
        self.stats.geometry_bytes = self.geometry.cursor();
        if frame.skipped_draws > 0 {
            engine_warn!(
                "arena::frame",
                "Geometry buffer full: {} draws skipped, growing to {} KiB",
                frame.skipped_draws,
                self.geometry.pending_resize().unwrap_or(0) / 1024
            );
        }
        Ok(())
    }

    pub fn present_frame(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidResource("present_frame called before end_frame".to_string()));
        }
        if let Some(image_index) = self.pending_present.take() {
            let wait = self
                .targets
                .rendering_finished
                .get(image_index as usize)
                .copied()
                .unwrap_or(SemaphoreHandle::NULL);
            match device.present(self.targets.swapchain.swapchain, image_index, wait)? {
                PresentOutcome::Presented => self.last_presented = Some(image_index),
                PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                    engine_debug!("arena::frame", "Surface changed on present, rebuilding");
                    self.last_presented = Some(image_index);
                    self.restart_after_present = true;
                }
                PresentOutcome::DeviceLost => {
                    engine_warn!("arena::frame", "Device lost on present");
                }
            }
        }

        if self.geometry.pending_resize().is_some() {
            device.wait_idle()?;
            if self.geometry.apply_resize(device)? {
                self.stats.geometry_regrows += 1;
            }
        }
        if !self.minimized && (self.restart_after_present || self.resize_pending) {
            self.restart(device)?;
        }

        self.current_slot = (self.current_slot + 1) % self.slots.len();
        Ok(())
    }

    /// Rebuild the swapchain and everything sized or formatted after it.
    /// While minimized the rebuild is deferred to the first frame after the
    /// window gets a size again.
    pub fn restart(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if self.minimized {
            engine_debug!("arena::frame", "Window minimized, deferring render target rebuild");
            self.restart_after_present = true;
            return Ok(());
        }
        device.wait_idle()?;

        self.pipelines.destroy_handles(device);
        self.post.destroy(device);
        self.targets.destroy(device);
        for slot in self.slots.iter_mut() {
            slot.recreate_sync(device)?;
        }

        self.targets = RenderTargets::build(device, &self.target_params())?;
        self.post = PostProcess::build(device, &self.shaders, self.layouts.post, &self.targets, &self.post_params())?;
        let ctx = pipeline_context(&self.shaders, &self.layouts, &self.targets, &self.context);
        self.pipelines.compile_eager(device, &ctx)?;

        self.resize_pending = false;
        self.restart_after_present = false;
        self.last_presented = None;
        self.pending_present = None;
        self.stats.restarts += 1;
        engine_info!(
            "arena::frame",
            "Render targets rebuilt at {}x{} ({} images)",
            self.targets.window_extent().width,
            self.targets.window_extent().height,
            self.targets.image_count()
        );
        Ok(())
    }
}
