//! One-shot transfers between host memory and device images
//!
//! Uploads and readbacks go through the staging buffer and a dedicated
//! command buffer that is submitted and waited on immediately.

use crate::device::*;
use crate::error::{Error, Result};
use crate::memory::StagingBuffer;
use crate::engine_trace;

/// Pixel data of one mip level, tightly packed
#[derive(Debug, Clone, Copy)]
pub struct MipData<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Where an upload lands inside the destination image
#[derive(Debug, Clone, Copy)]
pub struct UploadTarget {
    pub image: ImageHandle,
    pub format: Format,
    /// Total mip count of the image, every level is transitioned
    pub mip_levels: u32,
    /// Offset of a sub-rectangle update; `None` replaces the whole image
    pub offset: Option<(i32, i32)>,
}

pub struct TransferContext {
    staging: StagingBuffer,
    cmd: CommandBufferHandle,
    fence: FenceHandle,
}

impl TransferContext {
    pub fn new(device: &mut dyn GpuDevice) -> Result<Self> {
        let cmd = device.allocate_command_buffer()?;
        let fence = match device.create_fence(false) {
            Ok(fence) => fence,
            Err(err) => {
                device.free_command_buffer(cmd);
                return Err(err);
            }
        };
        Ok(Self { staging: StagingBuffer::new(), cmd, fence })
    }

    pub(crate) fn empty() -> Self {
        Self { staging: StagingBuffer::new(), cmd: CommandBufferHandle::NULL, fence: FenceHandle::NULL }
    }

    pub fn staging_size(&self) -> u64 {
        self.staging.size()
    }

    fn submit_and_wait(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        device.end_command_buffer(self.cmd)?;
        device.submit(self.cmd, &SubmitSync { wait: None, signal: None, fence: Some(self.fence) })?;
        match device.wait_fence(self.fence, FENCE_TIMEOUT_NS)? {
            FenceStatus::Signaled => device.reset_fence(self.fence),
            FenceStatus::Timeout => Err(Error::Timeout("transfer did not complete".to_string())),
        }
    }

    /// Copy `mips` into `target`, leaving the image shader-readable
    pub fn upload_image(&mut self, device: &mut dyn GpuDevice, target: &UploadTarget, mips: &[MipData<'_>]) -> Result<()> {
        let bpp = target.format.bytes_per_pixel() as usize;
        let mut packed = Vec::new();
        let mut regions = Vec::with_capacity(mips.len());
        for (level, mip) in mips.iter().enumerate() {
            let expected = mip.width as usize * mip.height as usize * bpp;
            if mip.data.len() != expected {
                return Err(Error::InvalidResource(format!(
                    "mip {} holds {} bytes, {}x{} needs {}",
                    level,
                    mip.data.len(),
                    mip.width,
                    mip.height,
                    expected
                )));
            }
            let (x, y) = target.offset.unwrap_or((0, 0));
            regions.push(BufferImageCopy {
                buffer_offset: packed.len() as u64,
                mip_level: level as u32,
                x,
                y,
                width: mip.width,
                height: mip.height,
            });
            packed.extend_from_slice(mip.data);
        }
        let buffer = self.staging.write(device, &packed)?;

        let old_layout = if target.offset.is_some() { ImageLayout::ShaderReadOnly } else { ImageLayout::Undefined };
        device.begin_command_buffer(self.cmd)?;
        device.record(
            self.cmd,
            &Command::PipelineBarrier(ImageBarrier {
                image: target.image,
                aspect: ImageAspect::Color,
                old_layout,
                new_layout: ImageLayout::TransferDst,
                src_stages: if target.offset.is_some() { PipelineStages::FRAGMENT_SHADER } else { PipelineStages::TOP_OF_PIPE },
                dst_stages: PipelineStages::TRANSFER,
                src_access: if target.offset.is_some() { AccessFlags::SHADER_READ } else { AccessFlags::empty() },
                dst_access: AccessFlags::TRANSFER_WRITE,
                base_mip: 0,
                mip_count: target.mip_levels,
            }),
        )?;
        device.record(self.cmd, &Command::CopyBufferToImage { buffer, image: target.image, regions })?;
        device.record(
            self.cmd,
            &Command::PipelineBarrier(ImageBarrier {
                image: target.image,
                aspect: ImageAspect::Color,
                old_layout: ImageLayout::TransferDst,
                new_layout: ImageLayout::ShaderReadOnly,
                src_stages: PipelineStages::TRANSFER,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::TRANSFER_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                base_mip: 0,
                mip_count: target.mip_levels,
            }),
        )?;
        engine_trace!("arena::transfer", "Uploading {} bytes in {} mips", packed.len(), mips.len());
        self.submit_and_wait(device)
    }

    /// Copy an image in `layout` back to host memory as top-down RGBA8
    pub fn read_image(
        &mut self,
        device: &mut dyn GpuDevice,
        image: ImageHandle,
        layout: ImageLayout,
        format: Format,
        extent: Extent2D,
    ) -> Result<Vec<u8>> {
        if format.bytes_per_pixel() != 4 || format.is_depth() || format == Format::A2B10G10R10_UNORM {
            return Err(Error::Unsupported(format!("readback of {:?}", format)));
        }
        let size = extent.width as u64 * extent.height as u64 * 4;
        let buffer = self.staging.ensure(device, size)?;

        let barrier = |old_layout, new_layout, src_access, dst_access| {
            Command::PipelineBarrier(ImageBarrier {
                image,
                aspect: ImageAspect::Color,
                old_layout,
                new_layout,
                src_stages: PipelineStages::TRANSFER | PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::TRANSFER | PipelineStages::BOTTOM_OF_PIPE,
                src_access,
                dst_access,
                base_mip: 0,
                mip_count: 1,
            })
        };

        device.begin_command_buffer(self.cmd)?;
        if layout != ImageLayout::TransferSrc {
            device.record(
                self.cmd,
                &barrier(layout, ImageLayout::TransferSrc, AccessFlags::MEMORY_READ, AccessFlags::TRANSFER_READ),
            )?;
        }
        device.record(
            self.cmd,
            &Command::CopyImageToBuffer {
                image,
                layout: ImageLayout::TransferSrc,
                buffer,
                region: BufferImageCopy {
                    buffer_offset: 0,
                    mip_level: 0,
                    x: 0,
                    y: 0,
                    width: extent.width,
                    height: extent.height,
                },
            },
        )?;
        if layout != ImageLayout::TransferSrc {
            device.record(
                self.cmd,
                &barrier(ImageLayout::TransferSrc, layout, AccessFlags::TRANSFER_READ, AccessFlags::MEMORY_READ),
            )?;
        }
        self.submit_and_wait(device)?;

        let mut pixels = vec![0u8; size as usize];
        device.read_buffer(buffer, 0, &mut pixels)?;
        if format.is_bgra() {
            for pixel in pixels.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
        }
        Ok(pixels)
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.staging.destroy(device);
        if !self.fence.is_null() {
            device.destroy_fence(self.fence);
            self.fence = FenceHandle::NULL;
        }
        if !self.cmd.is_null() {
            device.free_command_buffer(self.cmd);
            self.cmd = CommandBufferHandle::NULL;
        }
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
