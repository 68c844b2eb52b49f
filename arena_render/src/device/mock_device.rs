//! Mock device for unit tests (no GPU required)
//!
//! Every object is a counter-issued handle tracked in a table, so tests can
//! check for leaks, inspect recorded commands and script surface behaviour.
//! Submitted work completes immediately: a fence attached to a submission is
//! signaled as soon as `submit` returns.

use std::collections::VecDeque;
use rustc_hash::FxHashMap;

use crate::device::capabilities::*;
use crate::device::gpu_device::*;
use crate::device::handles::*;
use crate::device::types::*;
use crate::error::{Error, Result};

/// Observable device calls, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    WaitIdle,
    CreateSwapchain(SwapchainHandle),
    DestroySwapchain(SwapchainHandle),
    Acquire(SwapchainHandle),
    Present { swapchain: SwapchainHandle, image_index: u32 },
    WaitFence(FenceHandle),
    ResetFence(FenceHandle),
    BeginCommandBuffer(CommandBufferHandle),
    Record(CommandBufferHandle),
    Submit { cmd: CommandBufferHandle, fence: Option<FenceHandle> },
    CreatePipeline(PipelineHandle),
    DestroyPipeline(PipelineHandle),
    DestroyBuffer(BufferHandle),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub pipelines_created: u32,
    pub pipelines_destroyed: u32,
    pub swapchains_created: u32,
    pub memory_allocations: u32,
    pub submits: u32,
    pub presents: u32,
    pub acquires: u32,
    pub wait_idle: u32,
}

struct MockSwapchain {
    desc: SwapchainDesc,
    images: Vec<ImageHandle>,
    views: Vec<ImageViewHandle>,
    next_image: u32,
}

pub struct MockDevice {
    pub caps: DeviceCapabilities,
    pub surface: SurfaceCapabilities,
    pub counters: MockCounters,
    pub events: Vec<MockEvent>,

    /// Outcomes returned by the next acquire calls (default: acquired)
    pub acquire_script: VecDeque<AcquireOutcome>,
    /// Outcomes returned by the next present calls (default: presented)
    pub present_script: VecDeque<PresentOutcome>,
    /// Outcomes returned by the next fence waits (default: real fence state)
    pub fence_script: VecDeque<FenceStatus>,
    /// Make every pipeline compile fail
    pub fail_pipeline_compile: bool,
    /// Make every host buffer allocation fail
    pub fail_host_buffer: bool,

    next_handle: u64,
    pub commands: FxHashMap<CommandBufferHandle, Vec<Command>>,
    pub images: FxHashMap<ImageHandle, ImageDesc>,
    pub image_views: FxHashMap<ImageViewHandle, ImageHandle>,
    pub memory: FxHashMap<MemoryHandle, (u64, u32)>,
    pub bound_memory: FxHashMap<ImageHandle, (MemoryHandle, u64)>,
    pub buffers: FxHashMap<BufferHandle, Vec<u8>>,
    pub render_passes: FxHashMap<RenderPassHandle, RenderPassDesc>,
    pub framebuffers: FxHashMap<FramebufferHandle, FramebufferDesc>,
    pub shader_modules: FxHashMap<ShaderModuleHandle, String>,
    pub pipeline_layouts: FxHashMap<PipelineLayoutHandle, PipelineLayoutDesc>,
    pub pipelines: FxHashMap<PipelineHandle, GraphicsPipelineDesc>,
    pub set_layouts: FxHashMap<DescriptorSetLayoutHandle, DescriptorKind>,
    pub descriptor_pools: FxHashMap<DescriptorPoolHandle, Vec<DescriptorSetHandle>>,
    pub image_descriptors: FxHashMap<DescriptorSetHandle, (ImageViewHandle, SamplerHandle)>,
    pub buffer_descriptors: FxHashMap<DescriptorSetHandle, (BufferHandle, u64)>,
    pub samplers: FxHashMap<SamplerHandle, SamplerDesc>,
    pub fences: FxHashMap<FenceHandle, bool>,
    pub semaphores: FxHashMap<SemaphoreHandle, ()>,
    swapchains: FxHashMap<SwapchainHandle, MockSwapchain>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            caps: DeviceCapabilities {
                adapter_name: "Mock GPU".to_string(),
                adapter_type: AdapterType::Discrete,
                features: DeviceFeatures {
                    fill_mode_non_solid: true,
                    wide_lines: true,
                    sampler_anisotropy: true,
                    fragment_stores_and_atomics: true,
                    depth_clamp: true,
                    sample_rate_shading: true,
                },
                limits: DeviceLimits {
                    max_image_dimension_2d: 16384,
                    max_sampler_anisotropy: 16.0,
                    min_uniform_buffer_offset_alignment: 64,
                    max_push_constants_size: 128,
                    line_width_range: [1.0, 8.0],
                    framebuffer_color_samples: SampleCountFlags::TYPE_1
                        | SampleCountFlags::TYPE_2
                        | SampleCountFlags::TYPE_4,
                    framebuffer_depth_samples: SampleCountFlags::TYPE_1
                        | SampleCountFlags::TYPE_2
                        | SampleCountFlags::TYPE_4,
                },
                memory_types: vec![
                    MemoryType { properties: MemoryProperties::DEVICE_LOCAL, heap_index: 0 },
                    MemoryType {
                        properties: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
                        heap_index: 1,
                    },
                ],
                depth_formats: vec![Format::D24_UNORM_S8_UINT, Format::D32_SFLOAT],
                hdr_color: true,
            },
            surface: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: Some(Extent2D::new(800, 600)),
                min_extent: Extent2D::new(1, 1),
                max_extent: Extent2D::new(16384, 16384),
                formats: vec![SurfaceFormat {
                    format: Format::B8G8R8A8_UNORM,
                    color_space: ColorSpace::SrgbNonlinear,
                }],
                present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate],
                supported_usage: ImageUsage::COLOR_ATTACHMENT
                    | ImageUsage::TRANSFER_SRC
                    | ImageUsage::TRANSFER_DST,
            },
            counters: MockCounters::default(),
            events: Vec::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fence_script: VecDeque::new(),
            fail_pipeline_compile: false,
            fail_host_buffer: false,
            next_handle: 1,
            commands: FxHashMap::default(),
            images: FxHashMap::default(),
            image_views: FxHashMap::default(),
            memory: FxHashMap::default(),
            bound_memory: FxHashMap::default(),
            buffers: FxHashMap::default(),
            render_passes: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            shader_modules: FxHashMap::default(),
            pipeline_layouts: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            set_layouts: FxHashMap::default(),
            descriptor_pools: FxHashMap::default(),
            image_descriptors: FxHashMap::default(),
            buffer_descriptors: FxHashMap::default(),
            samplers: FxHashMap::default(),
            fences: FxHashMap::default(),
            semaphores: FxHashMap::default(),
            swapchains: FxHashMap::default(),
        }
    }

    fn issue(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Commands recorded into `cmd` since its last `begin_command_buffer`
    pub fn recorded(&self, cmd: CommandBufferHandle) -> &[Command] {
        self.commands.get(&cmd).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every recorded command across all command buffers
    pub fn all_recorded(&self) -> impl Iterator<Item = &Command> {
        self.commands.values().flatten()
    }

    /// Number of swapchains currently alive
    pub fn live_swapchains(&self) -> usize {
        self.swapchains.len()
    }

    pub fn swapchain_desc(&self, swapchain: SwapchainHandle) -> Option<SwapchainDesc> {
        self.swapchains.get(&swapchain).map(|s| s.desc)
    }

    /// Objects that are still alive (leak check after shutdown)
    pub fn live_objects(&self) -> usize {
        self.images.len()
            + self.image_views.len()
            + self.memory.len()
            + self.buffers.len()
            + self.render_passes.len()
            + self.framebuffers.len()
            + self.shader_modules.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
            + self.set_layouts.len()
            + self.descriptor_pools.len()
            + self.samplers.len()
            + self.fences.len()
            + self.semaphores.len()
            + self.commands.len()
            + self.swapchains.len()
    }

    /// Fill `region` of `buffer` with the mock image pattern
    ///
    /// Pixel `i` (row-major) holds bytes `[i, i >> 8, 0x80, 0xFF]`.
    fn fill_readback(&mut self, buffer: BufferHandle, region: &BufferImageCopy) -> Result<()> {
        let pixels = (region.width * region.height) as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for i in 0..pixels {
            data.extend_from_slice(&[i as u8, (i >> 8) as u8, 0x80, 0xFF]);
        }
        self.write_buffer(buffer, region.buffer_offset, &data)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn image_size(desc: &ImageDesc) -> u64 {
    let mut size = 0u64;
    let (mut w, mut h) = (desc.width as u64, desc.height as u64);
    for _ in 0..desc.mip_levels.max(1) {
        size += w * h;
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    let bytes = size * desc.format.bytes_per_pixel() as u64 * desc.samples.count() as u64;
    (bytes + 255) & !255
}

impl GpuDevice for MockDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn surface_capabilities(&mut self) -> Result<SurfaceCapabilities> {
        Ok(self.surface.clone())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.counters.wait_idle += 1;
        self.events.push(MockEvent::WaitIdle);
        Ok(())
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainImages> {
        let swapchain = SwapchainHandle(self.issue());
        let images: Vec<ImageHandle> = (0..desc.image_count).map(|_| ImageHandle(self.issue())).collect();
        let views: Vec<ImageViewHandle> = (0..desc.image_count).map(|_| ImageViewHandle(self.issue())).collect();
        self.swapchains.insert(
            swapchain,
            MockSwapchain { desc: *desc, images: images.clone(), views: views.clone(), next_image: 0 },
        );
        self.counters.swapchains_created += 1;
        self.events.push(MockEvent::CreateSwapchain(swapchain));
        Ok(SwapchainImages { swapchain, images, views })
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) {
        self.swapchains.remove(&swapchain);
        self.events.push(MockEvent::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &mut self,
        swapchain: SwapchainHandle,
        _signal: SemaphoreHandle,
        _timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        self.counters.acquires += 1;
        self.events.push(MockEvent::Acquire(swapchain));
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let chain = self
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| Error::InvalidResource("unknown swapchain".to_string()))?;
        let index = chain.next_image;
        chain.next_image = (chain.next_image + 1) % chain.images.len() as u32;
        Ok(AcquireOutcome::Acquired { index, suboptimal: false })
    }

    fn present(
        &mut self,
        swapchain: SwapchainHandle,
        image_index: u32,
        _wait: SemaphoreHandle,
    ) -> Result<PresentOutcome> {
        self.counters.presents += 1;
        self.events.push(MockEvent::Present { swapchain, image_index });
        Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    // ===== MEMORY =====

    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryRequirements)> {
        let image = ImageHandle(self.issue());
        self.images.insert(image, desc.clone());
        Ok((image, MemoryRequirements { size: image_size(desc), alignment: 256, memory_type_bits: 0b01 }))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.images.remove(&image);
        self.bound_memory.remove(&image);
    }

    fn allocate_memory(&mut self, size: u64, memory_type_index: u32) -> Result<MemoryHandle> {
        let memory = MemoryHandle(self.issue());
        self.memory.insert(memory, (size, memory_type_index));
        self.counters.memory_allocations += 1;
        Ok(memory)
    }

    fn free_memory(&mut self, memory: MemoryHandle) {
        self.memory.remove(&memory);
    }

    fn bind_image_memory(&mut self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<()> {
        let (size, _) = *self
            .memory
            .get(&memory)
            .ok_or_else(|| Error::InvalidResource("unknown memory".to_string()))?;
        let desc = self
            .images
            .get(&image)
            .ok_or_else(|| Error::InvalidResource("unknown image".to_string()))?;
        if offset + image_size(desc) > size {
            return Err(Error::InvalidResource("image bound past the end of its memory".to_string()));
        }
        self.bound_memory.insert(image, (memory, offset));
        Ok(())
    }

    fn create_image_view(&mut self, image: ImageHandle, _desc: &ImageDesc) -> Result<ImageViewHandle> {
        let view = ImageViewHandle(self.issue());
        self.image_views.insert(view, image);
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) {
        self.image_views.remove(&view);
    }

    fn create_host_buffer(&mut self, size: u64, _usage: BufferUsage) -> Result<BufferHandle> {
        if self.fail_host_buffer {
            return Err(Error::OutOfMemory);
        }
        let buffer = BufferHandle(self.issue());
        self.buffers.insert(buffer, vec![0; size as usize]);
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let contents = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let contents = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        let start = offset as usize;
        let end = start + out.len();
        if end > contents.len() {
            return Err(Error::InvalidResource("read past the end of buffer".to_string()));
        }
        out.copy_from_slice(&contents[start..end]);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.events.push(MockEvent::DestroyBuffer(buffer));
        self.buffers.remove(&buffer);
    }

    // ===== RENDER PASSES =====

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let pass = RenderPassHandle(self.issue());
        self.render_passes.insert(pass, desc.clone());
        Ok(pass)
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        self.render_passes.remove(&render_pass);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let framebuffer = FramebufferHandle(self.issue());
        self.framebuffers.insert(framebuffer, desc.clone());
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
    }

    // ===== PROGRAMS =====

    fn create_shader_module(&mut self, name: &str, _code: &[u8]) -> Result<ShaderModuleHandle> {
        let module = ShaderModuleHandle(self.issue());
        self.shader_modules.insert(module, name.to_string());
        Ok(module)
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) {
        self.shader_modules.remove(&module);
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let layout = PipelineLayoutHandle(self.issue());
        self.pipeline_layouts.insert(layout, desc.clone());
        Ok(layout)
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) {
        self.pipeline_layouts.remove(&layout);
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        if self.fail_pipeline_compile {
            return Err(Error::BackendError("mock pipeline compile failure".to_string()));
        }
        if !self.render_passes.contains_key(&desc.render_pass) {
            return Err(Error::InvalidResource("pipeline for a destroyed render pass".to_string()));
        }
        let pipeline = PipelineHandle(self.issue());
        self.pipelines.insert(pipeline, desc.clone());
        self.counters.pipelines_created += 1;
        self.events.push(MockEvent::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.pipelines.remove(&pipeline).is_some() {
            self.counters.pipelines_destroyed += 1;
        }
        self.events.push(MockEvent::DestroyPipeline(pipeline));
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(
        &mut self,
        kind: DescriptorKind,
        _stages: ShaderStages,
    ) -> Result<DescriptorSetLayoutHandle> {
        let layout = DescriptorSetLayoutHandle(self.issue());
        self.set_layouts.insert(layout, kind);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) {
        self.set_layouts.remove(&layout);
    }

    fn create_descriptor_pool(&mut self, _desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let pool = DescriptorPoolHandle(self.issue());
        self.descriptor_pools.insert(pool, Vec::new());
        Ok(pool)
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if let Some(sets) = self.descriptor_pools.remove(&pool) {
            for set in sets {
                self.image_descriptors.remove(&set);
                self.buffer_descriptors.remove(&set);
            }
        }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        _layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        let set = DescriptorSetHandle(self.issue());
        self.descriptor_pools
            .get_mut(&pool)
            .ok_or_else(|| Error::InvalidResource("unknown descriptor pool".to_string()))?
            .push(set);
        Ok(set)
    }

    fn free_descriptor_set(&mut self, pool: DescriptorPoolHandle, set: DescriptorSetHandle) {
        if let Some(sets) = self.descriptor_pools.get_mut(&pool) {
            sets.retain(|s| *s != set);
        }
        self.image_descriptors.remove(&set);
        self.buffer_descriptors.remove(&set);
    }

    fn write_image_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        view: ImageViewHandle,
        sampler: SamplerHandle,
    ) -> Result<()> {
        self.image_descriptors.insert(set, (view, sampler));
        Ok(())
    }

    fn write_buffer_descriptor(&mut self, set: DescriptorSetHandle, buffer: BufferHandle, range: u64) -> Result<()> {
        self.buffer_descriptors.insert(set, (buffer, range));
        Ok(())
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let sampler = SamplerHandle(self.issue());
        self.samplers.insert(sampler, *desc);
        Ok(sampler)
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler);
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        let fence = FenceHandle(self.issue());
        self.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn wait_fence(&mut self, fence: FenceHandle, _timeout_ns: u64) -> Result<FenceStatus> {
        self.events.push(MockEvent::WaitFence(fence));
        if let Some(status) = self.fence_script.pop_front() {
            return Ok(status);
        }
        match self.fences.get(&fence) {
            Some(true) => Ok(FenceStatus::Signaled),
            Some(false) => Ok(FenceStatus::Timeout),
            None => Err(Error::InvalidResource("unknown fence".to_string())),
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        self.events.push(MockEvent::ResetFence(fence));
        let state = self
            .fences
            .get_mut(&fence)
            .ok_or_else(|| Error::InvalidResource("unknown fence".to_string()))?;
        *state = false;
        Ok(())
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(&fence);
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        let semaphore = SemaphoreHandle(self.issue());
        self.semaphores.insert(semaphore, ());
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        self.semaphores.remove(&semaphore);
    }

    // ===== COMMANDS =====

    fn allocate_command_buffer(&mut self) -> Result<CommandBufferHandle> {
        let cmd = CommandBufferHandle(self.issue());
        self.commands.insert(cmd, Vec::new());
        Ok(cmd)
    }

    fn free_command_buffer(&mut self, cmd: CommandBufferHandle) {
        self.commands.remove(&cmd);
    }

    fn begin_command_buffer(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        self.events.push(MockEvent::BeginCommandBuffer(cmd));
        self.commands
            .get_mut(&cmd)
            .ok_or_else(|| Error::InvalidResource("unknown command buffer".to_string()))?
            .clear();
        Ok(())
    }

    fn end_command_buffer(&mut self, _cmd: CommandBufferHandle) -> Result<()> {
        Ok(())
    }

    fn record(&mut self, cmd: CommandBufferHandle, command: &Command) -> Result<()> {
        if let Command::CopyImageToBuffer { buffer, region, .. } = command {
            self.fill_readback(*buffer, region)?;
        }
        self.events.push(MockEvent::Record(cmd));
        self.commands
            .get_mut(&cmd)
            .ok_or_else(|| Error::InvalidResource("unknown command buffer".to_string()))?
            .push(command.clone());
        Ok(())
    }

    fn submit(&mut self, cmd: CommandBufferHandle, sync: &SubmitSync) -> Result<()> {
        self.counters.submits += 1;
        self.events.push(MockEvent::Submit { cmd, fence: sync.fence });
        if let Some(fence) = sync.fence {
            if let Some(state) = self.fences.get_mut(&fence) {
                *state = true;
            }
        }
        Ok(())
    }
}
