//! GpuDevice trait - the seam between the backend and a graphics driver
//!
//! Every backend component talks to the device through this trait, passed in
//! as `&mut dyn GpuDevice`. The Vulkan driver implements it with ash; tests
//! use `MockDevice`.

use crate::error::Result;
use crate::device::capabilities::DeviceCapabilities;
use crate::device::handles::*;
use crate::device::types::*;

/// Result of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` asks for a rebuild after presenting
    Acquired { index: u32, suboptimal: bool },
    /// The surface changed and the swapchain must be rebuilt
    OutOfDate,
    /// No image became available within the timeout
    Timeout,
    DeviceLost,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
    DeviceLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    Timeout,
}

/// Graphics device operations used by the backend
///
/// Destroy calls never fail: drivers log problems and carry on, so teardown
/// always runs to completion.
pub trait GpuDevice {
    // ===== CAPABILITIES =====

    /// Features, limits and formats of the selected physical device
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Current state of the presentation surface
    fn surface_capabilities(&mut self) -> Result<SurfaceCapabilities>;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) -> Result<()>;

    // ===== SWAPCHAIN =====

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainImages>;

    /// Also destroys the image views returned by `create_swapchain`
    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle);

    fn acquire_next_image(
        &mut self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome>;

    fn present(
        &mut self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> Result<PresentOutcome>;

    // ===== MEMORY =====

    /// Create an image without memory; the caller binds memory it allocated
    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryRequirements)>;

    fn destroy_image(&mut self, image: ImageHandle);

    fn allocate_memory(&mut self, size: u64, memory_type_index: u32) -> Result<MemoryHandle>;

    fn free_memory(&mut self, memory: MemoryHandle);

    fn bind_image_memory(&mut self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<()>;

    fn create_image_view(&mut self, image: ImageHandle, desc: &ImageDesc) -> Result<ImageViewHandle>;

    fn destroy_image_view(&mut self, view: ImageViewHandle);

    /// Host-visible, coherent, persistently mapped buffer
    fn create_host_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, out: &mut [u8]) -> Result<()>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // ===== RENDER PASSES =====

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // ===== PROGRAMS =====

    /// `code` is a SPIR-V blob; `name` is used for diagnostics only
    fn create_shader_module(&mut self, name: &str, code: &[u8]) -> Result<ShaderModuleHandle>;

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle);

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle);

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(
        &mut self,
        kind: DescriptorKind,
        stages: ShaderStages,
    ) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle);

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle>;

    /// Also frees every set allocated from the pool
    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle);

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle>;

    /// Return one set to a pool created with individually freeable sets
    fn free_descriptor_set(&mut self, pool: DescriptorPoolHandle, set: DescriptorSetHandle);

    /// Point a combined image sampler set at a shader-readable view
    fn write_image_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        view: ImageViewHandle,
        sampler: SamplerHandle,
    ) -> Result<()>;

    /// Point a dynamic uniform/storage set at `range` bytes of a buffer
    fn write_buffer_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        buffer: BufferHandle,
        range: u64,
    ) -> Result<()>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle>;

    fn wait_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<FenceStatus>;

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()>;

    fn destroy_fence(&mut self, fence: FenceHandle);

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle>;

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle);

    // ===== COMMANDS =====

    fn allocate_command_buffer(&mut self) -> Result<CommandBufferHandle>;

    fn free_command_buffer(&mut self, cmd: CommandBufferHandle);

    /// Resets the buffer and starts a one-time-submit recording
    fn begin_command_buffer(&mut self, cmd: CommandBufferHandle) -> Result<()>;

    fn end_command_buffer(&mut self, cmd: CommandBufferHandle) -> Result<()>;

    fn record(&mut self, cmd: CommandBufferHandle, command: &Command) -> Result<()>;

    fn submit(&mut self, cmd: CommandBufferHandle, sync: &SubmitSync) -> Result<()>;
}
