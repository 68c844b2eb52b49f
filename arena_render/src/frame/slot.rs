//! Frame slots: the rotating per-frame command buffer and sync objects

use crate::device::*;
use crate::error::{Error, Result};
use crate::engine_trace;

/// Frames the CPU may record ahead of the GPU, plus one
pub const FRAME_SLOTS: usize = 2;

/// Where a slot is in its `Idle -> Acquiring -> Recording -> Submitted` cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
}

pub struct FrameSlot {
    pub cmd: CommandBufferHandle,
    /// Signaled by the acquire, waited on by the submission
    pub image_acquired: SemaphoreHandle,
    /// Signaled when the slot's last submission completed
    pub fence: FenceHandle,
    pub state: FrameState,
}

impl FrameSlot {
    pub fn create(device: &mut dyn GpuDevice) -> Result<Self> {
        let mut slot = Self {
            cmd: CommandBufferHandle::NULL,
            image_acquired: SemaphoreHandle::NULL,
            fence: FenceHandle::NULL,
            state: FrameState::Idle,
        };
        let result = device.allocate_command_buffer().and_then(|cmd| {
            slot.cmd = cmd;
            slot.create_sync(device)
        });
        match result {
            Ok(()) => Ok(slot),
            Err(err) => {
                slot.destroy(device);
                Err(err)
            }
        }
    }

    /// The fence starts signaled so the first wait returns at once
    fn create_sync(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.image_acquired = device.create_semaphore()?;
        self.fence = device.create_fence(true)?;
        Ok(())
    }

    fn destroy_sync(&mut self, device: &mut dyn GpuDevice) {
        if !self.image_acquired.is_null() {
            device.destroy_semaphore(self.image_acquired);
            self.image_acquired = SemaphoreHandle::NULL;
        }
        if !self.fence.is_null() {
            device.destroy_fence(self.fence);
            self.fence = FenceHandle::NULL;
        }
    }

    /// Replace the semaphore and fence. The device must be idle.
    pub fn recreate_sync(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.destroy_sync(device);
        self.state = FrameState::Idle;
        self.create_sync(device)
    }

    /// Block until the slot's previous submission completed
    pub fn wait(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        match device.wait_fence(self.fence, FENCE_TIMEOUT_NS)? {
            FenceStatus::Signaled => {
                engine_trace!("arena::frame", "Fence {} signaled", self.fence.raw());
                self.state = FrameState::Idle;
                Ok(())
            }
            FenceStatus::Timeout => Err(Error::Timeout(format!(
                "frame fence not signaled after {} ms",
                FENCE_TIMEOUT_NS / 1_000_000
            ))),
        }
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.destroy_sync(device);
        if !self.cmd.is_null() {
            device.free_command_buffer(self.cmd);
            self.cmd = CommandBufferHandle::NULL;
        }
    }
}
