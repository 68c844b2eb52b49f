//! VulkanDevice - the ash implementation of `GpuDevice`
//!
//! Device objects are handed out as their raw Vulkan handle values. Host
//! buffers and swapchains carry driver-side state and live in slot maps
//! instead; their handles are the slot map keys.

use arena_render::arena::{Config, Error, Result};
use arena_render::device::*;
use arena_render::{engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use ash::vk::{self, Handle};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationError, MemoryLocation};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::mem::ManuallyDrop;

use crate::convert::*;
use crate::instance::{init_failed, InstanceObjects};
use crate::reflect::{decode_spirv, reflect_shader, ShaderInfo, ENTRY_POINT};

new_key_type! {
    struct BufferKey;
    struct SwapchainKey;
}

/// Map a failed Vulkan call to the backend's error kinds
pub(crate) fn vk_err(what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            engine_error!("arena::vulkan", "Out of memory: {}", what);
            Error::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => {
            engine_error!("arena::vulkan", "Device lost: {}", what);
            Error::DeviceLost
        }
        other => engine_err!("arena::vulkan", "Failed to {}: {:?}", what, other),
    }
}

fn alloc_err(what: &str, e: AllocationError) -> Error {
    match e {
        AllocationError::OutOfMemory => {
            engine_error!("arena::vulkan", "Out of memory: {}", what);
            Error::OutOfMemory
        }
        other => engine_err!("arena::vulkan", "Failed to {}: {}", what, other),
    }
}

/// Raw handle value back to its Vulkan type
pub(crate) fn to_vk<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

fn key_handle<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}

fn handle_key<K: Key>(raw: u64) -> K {
    K::from(KeyData::from_ffi(raw))
}

pub(crate) struct HostBuffer {
    pub buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

struct SwapchainRecord {
    swapchain: vk::SwapchainKHR,
    views: Vec<vk::ImageView>,
}

#[derive(Clone, Copy)]
struct SetRecord {
    kind: DescriptorKind,
    pool: vk::DescriptorPool,
}

/// Vulkan graphics device bound to one window surface
pub struct VulkanDevice {
    objects: InstanceObjects,
    physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    allocator: ManuallyDrop<Allocator>,
    caps: DeviceCapabilities,

    buffers: SlotMap<BufferKey, HostBuffer>,
    swapchains: SlotMap<SwapchainKey, SwapchainRecord>,
    set_layouts: FxHashMap<u64, DescriptorKind>,
    sets: FxHashMap<u64, SetRecord>,
    shader_info: FxHashMap<u64, ShaderInfo>,
    /// (push constant size, set count) per pipeline layout
    layout_info: FxHashMap<u64, (u32, usize)>,
    /// Render passes whose depth attachment carries stencil
    stencil_passes: FxHashMap<u64, bool>,
    /// Stencil aspect of the render pass being recorded
    pub(crate) pass_has_stencil: bool,
}

impl VulkanDevice {
    /// Create the instance, pick a device and open it for `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        unsafe {
            let mut objects = InstanceObjects::create(window, config)?;
            match Self::open(&objects, config) {
                Ok(opened) => Ok(Self::assemble(objects, opened)),
                Err(err) => {
                    objects.destroy();
                    Err(err)
                }
            }
        }
    }

    unsafe fn open(objects: &InstanceObjects, config: &Config) -> Result<Opened> {
        let adapters = objects.enumerate_adapters()?;
        let infos: Vec<AdapterInfo> = adapters.iter().map(|(_, info)| info.clone()).collect();
        let index = select_physical_device(&infos, config.device_index)?;
        let (physical_device, adapter) = &adapters[index];
        let queue_family = find_queue_family(&adapter.queue_families)
            .ok_or_else(|| Error::Unsupported(format!("{}: no graphics+present queue", adapter.name)))?;

        let caps = objects.capabilities(*physical_device, adapter);
        let device = objects.create_device(*physical_device, queue_family, &adapter.features)?;
        let queue = device.get_device_queue(queue_family, 0);

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match device.create_command_pool(&pool_info, None) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_device(None);
                return Err(init_failed("create the command pool", e));
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: objects.instance.clone(),
            device: device.clone(),
            physical_device: *physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_command_pool(command_pool, None);
                device.destroy_device(None);
                return Err(init_failed("create the GPU allocator", e));
            }
        };

        engine_info!(
            "arena::vulkan",
            "Opened {} (queue family {}, {} memory types)",
            caps.adapter_name,
            queue_family,
            caps.memory_types.len()
        );
        Ok(Opened { physical_device: *physical_device, device, queue, command_pool, allocator, caps })
    }

    fn assemble(objects: InstanceObjects, opened: Opened) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(&objects.instance, &opened.device);
        Self {
            objects,
            physical_device: opened.physical_device,
            device: opened.device,
            swapchain_loader,
            queue: opened.queue,
            command_pool: opened.command_pool,
            allocator: ManuallyDrop::new(opened.allocator),
            caps: opened.caps,
            buffers: SlotMap::with_key(),
            swapchains: SlotMap::with_key(),
            set_layouts: FxHashMap::default(),
            sets: FxHashMap::default(),
            shader_info: FxHashMap::default(),
            layout_info: FxHashMap::default(),
            stencil_passes: FxHashMap::default(),
            pass_has_stencil: false,
        }
    }

    pub(crate) fn host_buffer(&self, buffer: BufferHandle) -> Result<&HostBuffer> {
        self.buffers
            .get(handle_key::<BufferKey>(buffer.0))
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer {:#x}", buffer.0)))
    }

    fn swapchain(&self, swapchain: SwapchainHandle) -> Result<&SwapchainRecord> {
        self.swapchains
            .get(handle_key::<SwapchainKey>(swapchain.0))
            .ok_or_else(|| Error::InvalidResource(format!("unknown swapchain {:#x}", swapchain.0)))
    }

    unsafe fn create_view(
        &self,
        image: vk::Image,
        format: Format,
        mip_levels: u32,
    ) -> std::result::Result<vk::ImageView, vk::Result> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format_to_vk(format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_to_vk(ImageAspect::for_format(format)),
                base_mip_level: 0,
                level_count: mip_levels.max(1),
                base_array_layer: 0,
                layer_count: 1,
            });
        self.device.create_image_view(&info, None)
    }

    /// Reflection results must fit the layout the pipeline is built with
    fn check_stage(&self, stage: &ShaderStageDesc, layout: PipelineLayoutHandle) -> Result<()> {
        let (Some(info), Some(&(push_size, set_count))) =
            (self.shader_info.get(&stage.module.0), self.layout_info.get(&layout.0))
        else {
            return Ok(());
        };
        if let Some(size) = info.push_constant_size {
            if size > push_size {
                return Err(Error::InvalidResource(format!(
                    "shader push constants ({} bytes) exceed the layout's {} bytes",
                    size, push_size
                )));
            }
        }
        if let Some(set) = info.max_set {
            if set as usize >= set_count {
                return Err(Error::InvalidResource(format!(
                    "shader reads descriptor set {} but the layout has {} sets",
                    set, set_count
                )));
            }
        }
        Ok(())
    }
}

struct Opened {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    allocator: Allocator,
    caps: DeviceCapabilities,
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                engine_warn!("arena::vulkan", "wait idle before teardown failed: {:?}", e);
            }
            for (_, record) in self.swapchains.drain() {
                for view in record.views {
                    self.device.destroy_image_view(view, None);
                }
                self.swapchain_loader.destroy_swapchain(record.swapchain, None);
            }
            for (_, buffer) in self.buffers.drain() {
                if let Err(e) = self.allocator.free(buffer.allocation) {
                    engine_warn!("arena::vulkan", "Failed to free buffer memory: {}", e);
                }
                self.device.destroy_buffer(buffer.buffer, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            self.objects.destroy();
        }
        engine_debug!("arena::vulkan", "Vulkan device destroyed");
    }
}

impl GpuDevice for VulkanDevice {
    // ===== CAPABILITIES =====

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn surface_capabilities(&mut self) -> Result<SurfaceCapabilities> {
        let loader = &self.objects.surface_loader;
        let surface = self.objects.surface;
        unsafe {
            let caps = loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
                .map_err(|e| vk_err("query surface capabilities", e))?;
            let formats = loader
                .get_physical_device_surface_formats(self.physical_device, surface)
                .map_err(|e| vk_err("query surface formats", e))?;
            let modes = loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
                .map_err(|e| vk_err("query present modes", e))?;

            Ok(SurfaceCapabilities {
                min_image_count: caps.min_image_count,
                max_image_count: caps.max_image_count,
                current_extent: (caps.current_extent.width != u32::MAX).then(|| extent_from_vk(caps.current_extent)),
                min_extent: extent_from_vk(caps.min_image_extent),
                max_extent: extent_from_vk(caps.max_image_extent),
                formats: formats
                    .iter()
                    .filter_map(|f| {
                        format_from_vk(f.format)
                            .map(|format| SurfaceFormat { format, color_space: color_space_from_vk(f.color_space) })
                    })
                    .collect(),
                present_modes: modes.iter().copied().filter_map(present_mode_from_vk).collect(),
                supported_usage: image_usage_from_vk(caps.supported_usage_flags),
            })
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle().map_err(|e| vk_err("wait for the device", e)) }
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainImages> {
        unsafe {
            let surface_caps = self
                .objects
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.objects.surface)
                .map_err(|e| vk_err("query surface capabilities", e))?;
            let composite_alpha = [
                vk::CompositeAlphaFlagsKHR::OPAQUE,
                vk::CompositeAlphaFlagsKHR::INHERIT,
                vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
                vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
            ]
            .into_iter()
            .find(|&mode| surface_caps.supported_composite_alpha.contains(mode))
            .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

            let info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.objects.surface)
                .min_image_count(desc.image_count)
                .image_format(format_to_vk(desc.format.format))
                .image_color_space(color_space_to_vk(desc.format.color_space))
                .image_extent(vk::Extent2D { width: desc.extent.width, height: desc.extent.height })
                .image_array_layers(1)
                .image_usage(image_usage_to_vk(desc.usage))
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(surface_caps.current_transform)
                .composite_alpha(composite_alpha)
                .present_mode(present_mode_to_vk(desc.present_mode))
                .clipped(true);
            let swapchain = self
                .swapchain_loader
                .create_swapchain(&info, None)
                .map_err(|e| vk_err("create the swapchain", e))?;

            let images = match self.swapchain_loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    self.swapchain_loader.destroy_swapchain(swapchain, None);
                    return Err(vk_err("get swapchain images", e));
                }
            };
            let mut views = Vec::with_capacity(images.len());
            for &image in &images {
                match self.create_view(image, desc.format.format, 1) {
                    Ok(view) => views.push(view),
                    Err(e) => {
                        for view in views {
                            self.device.destroy_image_view(view, None);
                        }
                        self.swapchain_loader.destroy_swapchain(swapchain, None);
                        return Err(vk_err("create a swapchain image view", e));
                    }
                }
            }

            engine_debug!(
                "arena::vulkan",
                "Swapchain {}x{} {:?} with {} images ({:?})",
                desc.extent.width,
                desc.extent.height,
                desc.format.format,
                images.len(),
                desc.present_mode
            );
            let result = SwapchainImages {
                swapchain: SwapchainHandle::NULL,
                images: images.iter().map(|i| ImageHandle(i.as_raw())).collect(),
                views: views.iter().map(|v| ImageViewHandle(v.as_raw())).collect(),
            };
            let key = self.swapchains.insert(SwapchainRecord { swapchain, views });
            Ok(SwapchainImages { swapchain: SwapchainHandle(key_handle(key)), ..result })
        }
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) {
        let Some(record) = self.swapchains.remove(handle_key::<SwapchainKey>(swapchain.0)) else {
            engine_warn!("arena::vulkan", "destroy_swapchain: unknown swapchain {:#x}", swapchain.0);
            return;
        };
        unsafe {
            for view in record.views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(record.swapchain, None);
        }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let swapchain = self.swapchain(swapchain)?.swapchain;
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, to_vk(signal.0), vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(vk::Result::ERROR_DEVICE_LOST) => Ok(AcquireOutcome::DeviceLost),
            Err(e) => Err(vk_err("acquire a swapchain image", e)),
        }
    }

    fn present(&mut self, swapchain: SwapchainHandle, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain(swapchain)?.swapchain];
        let indices = [image_index];
        let waits = [to_vk::<vk::Semaphore>(wait.0)];
        let wait_slice: &[vk::Semaphore] = if wait.is_null() { &[] } else { &waits };
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_slice)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.swapchain_loader.queue_present(self.queue, &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(vk::Result::ERROR_DEVICE_LOST) => Ok(PresentOutcome::DeviceLost),
            Err(e) => Err(vk_err("present", e)),
        }
    }

    // ===== MEMORY =====

    fn create_image(&mut self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryRequirements)> {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format_to_vk(desc.format))
            .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(1)
            .samples(sample_count_to_vk(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        unsafe {
            let image = self
                .device
                .create_image(&info, None)
                .map_err(|e| vk_err(&format!("create image '{}'", desc.name), e))?;
            let requirements = self.device.get_image_memory_requirements(image);
            engine_trace!(
                "arena::vulkan",
                "Image '{}' {}x{} {:?}: {} bytes",
                desc.name,
                desc.width,
                desc.height,
                desc.format,
                requirements.size
            );
            Ok((
                ImageHandle(image.as_raw()),
                MemoryRequirements {
                    size: requirements.size,
                    alignment: requirements.alignment,
                    memory_type_bits: requirements.memory_type_bits,
                },
            ))
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        unsafe { self.device.destroy_image(to_vk(image.0), None) }
    }

    fn allocate_memory(&mut self, size: u64, memory_type_index: u32) -> Result<MemoryHandle> {
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { self.device.allocate_memory(&info, None) }
            .map_err(|e| vk_err(&format!("allocate {} bytes of type {}", size, memory_type_index), e))?;
        Ok(MemoryHandle(memory.as_raw()))
    }

    fn free_memory(&mut self, memory: MemoryHandle) {
        unsafe { self.device.free_memory(to_vk(memory.0), None) }
    }

    fn bind_image_memory(&mut self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<()> {
        unsafe {
            self.device
                .bind_image_memory(to_vk(image.0), to_vk(memory.0), offset)
                .map_err(|e| vk_err("bind image memory", e))
        }
    }

    fn create_image_view(&mut self, image: ImageHandle, desc: &ImageDesc) -> Result<ImageViewHandle> {
        unsafe { self.create_view(to_vk(image.0), desc.format, desc.mip_levels) }
            .map(|view| ImageViewHandle(view.as_raw()))
            .map_err(|e| vk_err(&format!("create a view of '{}'", desc.name), e))
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) {
        unsafe { self.device.destroy_image_view(to_vk(view.0), None) }
    }

    fn create_host_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferHandle> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(buffer_usage_to_vk(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe {
            let buffer = self
                .device
                .create_buffer(&info, None)
                .map_err(|e| vk_err("create a host buffer", e))?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let location = if usage.contains(BufferUsage::TRANSFER_DST) {
                MemoryLocation::GpuToCpu
            } else {
                MemoryLocation::CpuToGpu
            };
            let allocation = match self.allocator.allocate(&AllocationCreateDesc {
                name: "host buffer",
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(alloc_err("allocate host buffer memory", e));
                }
            };

            let bound = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset());
            if let Err(e) = bound {
                let _ = self.allocator.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(vk_err("bind host buffer memory", e));
            }
            if allocation.mapped_ptr().is_none() {
                let _ = self.allocator.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(Error::BackendError("host buffer memory is not mappable".to_string()));
            }

            let key = self.buffers.insert(HostBuffer { buffer, allocation, size });
            Ok(BufferHandle(key_handle(key)))
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let record = self
            .buffers
            .get_mut(handle_key::<BufferKey>(buffer.0))
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer {:#x}", buffer.0)))?;
        let end = offset + data.len() as u64;
        if end > record.size {
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at {} overruns a {} byte buffer",
                data.len(),
                offset,
                record.size
            )));
        }
        let mapped = record
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| Error::BackendError("host buffer is not mapped".to_string()))?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let record = self.host_buffer(buffer)?;
        let end = offset + out.len() as u64;
        if end > record.size {
            return Err(Error::InvalidResource(format!(
                "read of {} bytes at {} overruns a {} byte buffer",
                out.len(),
                offset,
                record.size
            )));
        }
        let mapped = record
            .allocation
            .mapped_slice()
            .ok_or_else(|| Error::BackendError("host buffer is not mapped".to_string()))?;
        out.copy_from_slice(&mapped[offset as usize..end as usize]);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let Some(record) = self.buffers.remove(handle_key::<BufferKey>(buffer.0)) else {
            engine_warn!("arena::vulkan", "destroy_buffer: unknown buffer {:#x}", buffer.0);
            return;
        };
        if let Err(e) = self.allocator.free(record.allocation) {
            engine_warn!("arena::vulkan", "Failed to free buffer memory: {}", e);
        }
        unsafe { self.device.destroy_buffer(record.buffer, None) }
    }

    // ===== RENDER PASSES =====

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let attachments: Vec<vk::AttachmentDescription> = desc
            .attachments
            .iter()
            .map(|a| {
                vk::AttachmentDescription::default()
                    .format(format_to_vk(a.format))
                    .samples(sample_count_to_vk(a.samples))
                    .load_op(load_op_to_vk(a.load_op))
                    .store_op(store_op_to_vk(a.store_op))
                    .stencil_load_op(load_op_to_vk(a.stencil_load_op))
                    .stencil_store_op(store_op_to_vk(a.stencil_store_op))
                    .initial_layout(image_layout_to_vk(a.initial_layout))
                    .final_layout(image_layout_to_vk(a.final_layout))
            })
            .collect();

        let reference = |index: u32, layout: vk::ImageLayout| vk::AttachmentReference { attachment: index, layout };
        let color_refs: Vec<_> =
            desc.color.map(|i| reference(i, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)).into_iter().collect();
        let resolve_refs: Vec<_> =
            desc.resolve.map(|i| reference(i, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)).into_iter().collect();
        let depth_ref = desc.depth.map(|i| reference(i, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        let dependencies: Vec<vk::SubpassDependency> = desc
            .dependencies
            .iter()
            .map(|d| {
                let (src, dst) = match d.direction {
                    DependencyDirection::Incoming => (vk::SUBPASS_EXTERNAL, 0),
                    DependencyDirection::Outgoing => (0, vk::SUBPASS_EXTERNAL),
                };
                vk::SubpassDependency::default()
                    .src_subpass(src)
                    .dst_subpass(dst)
                    .src_stage_mask(pipeline_stages_to_vk(d.src_stages))
                    .dst_stage_mask(pipeline_stages_to_vk(d.dst_stages))
                    .src_access_mask(access_to_vk(d.src_access))
                    .dst_access_mask(access_to_vk(d.dst_access))
                    .dependency_flags(vk::DependencyFlags::BY_REGION)
            })
            .collect();

        let subpasses = [subpass];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe { self.device.create_render_pass(&info, None) }
            .map_err(|e| vk_err(&format!("create render pass '{}'", desc.name), e))?;
        let has_stencil = desc
            .depth
            .and_then(|i| desc.attachments.get(i as usize))
            .is_some_and(|a| a.format.has_stencil());
        self.stencil_passes.insert(render_pass.as_raw(), has_stencil);
        Ok(RenderPassHandle(render_pass.as_raw()))
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        self.stencil_passes.remove(&render_pass.0);
        unsafe { self.device.destroy_render_pass(to_vk(render_pass.0), None) }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let views: Vec<vk::ImageView> = desc.attachments.iter().map(|v| to_vk(v.0)).collect();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(to_vk(desc.render_pass.0))
            .attachments(&views)
            .width(desc.width)
            .height(desc.height)
            .layers(1);
        let framebuffer =
            unsafe { self.device.create_framebuffer(&info, None) }.map_err(|e| vk_err("create a framebuffer", e))?;
        Ok(FramebufferHandle(framebuffer.as_raw()))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        unsafe { self.device.destroy_framebuffer(to_vk(framebuffer.0), None) }
    }

    // ===== PROGRAMS =====

    fn create_shader_module(&mut self, name: &str, code: &[u8]) -> Result<ShaderModuleHandle> {
        let words = decode_spirv(name, code)?;
        let info = reflect_shader(name, &words)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(|e| vk_err(&format!("create shader module '{}'", name), e))?;
        engine_trace!(
            "arena::vulkan",
            "Shader '{}': max set {:?}, push constants {:?}",
            name,
            info.max_set,
            info.push_constant_size
        );
        self.shader_info.insert(module.as_raw(), info);
        Ok(ShaderModuleHandle(module.as_raw()))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) {
        self.shader_info.remove(&module.0);
        unsafe { self.device.destroy_shader_module(to_vk(module.0), None) }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = desc.set_layouts.iter().map(|l| to_vk(l.0)).collect();
        let ranges = [vk::PushConstantRange {
            stage_flags: shader_stages_to_vk(desc.push_constant_stages),
            offset: 0,
            size: desc.push_constant_size,
        }];
        let mut info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        if desc.push_constant_size > 0 {
            info = info.push_constant_ranges(&ranges);
        }
        let layout = unsafe { self.device.create_pipeline_layout(&info, None) }
            .map_err(|e| vk_err("create a pipeline layout", e))?;
        self.layout_info
            .insert(layout.as_raw(), (desc.push_constant_size, desc.set_layouts.len()));
        Ok(PipelineLayoutHandle(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) {
        self.layout_info.remove(&layout.0);
        unsafe { self.device.destroy_pipeline_layout(to_vk(layout.0), None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        self.check_stage(&desc.vertex, desc.layout)?;
        self.check_stage(&desc.fragment, desc.layout)?;

        let (vs_entries, vs_data) = specialization(&desc.vertex.specialization);
        let (fs_entries, fs_data) = specialization(&desc.fragment.specialization);
        let vs_spec = vk::SpecializationInfo::default().map_entries(&vs_entries).data(&vs_data);
        let fs_spec = vk::SpecializationInfo::default().map_entries(&fs_entries).data(&fs_data);
        let entry = std::ffi::CString::new(ENTRY_POINT).unwrap_or_default();

        let mut vertex_stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(to_vk(desc.vertex.module.0))
            .name(&entry);
        if !vs_entries.is_empty() {
            vertex_stage = vertex_stage.specialization_info(&vs_spec);
        }
        let mut fragment_stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(to_vk(desc.fragment.module.0))
            .name(&entry);
        if !fs_entries.is_empty() {
            fragment_stage = fragment_stage.specialization_info(&fs_spec);
        }
        let stages = [vertex_stage, fragment_stage];

        let bindings: Vec<vk::VertexInputBindingDescription> = desc
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: vertex_format_to_vk(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology_to_vk(desc.topology));
        let viewport = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(desc.raster.depth_clamp)
            .polygon_mode(polygon_mode_to_vk(desc.raster.polygon_mode))
            .cull_mode(cull_mode_to_vk(desc.raster.cull_mode))
            .front_face(front_face_to_vk(desc.raster.front_face))
            .depth_bias_enable(desc.raster.depth_bias)
            .line_width(desc.raster.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(sample_count_to_vk(desc.samples))
            .sample_shading_enable(desc.sample_shading)
            .min_sample_shading(if desc.sample_shading { 1.0 } else { 0.0 });

        let mut depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_stencil.depth_test)
            .depth_write_enable(desc.depth_stencil.depth_write)
            .depth_compare_op(compare_op_to_vk(desc.depth_stencil.depth_compare));
        if let Some((front, back)) = desc.depth_stencil.stencil.as_ref() {
            depth_stencil = depth_stencil
                .stencil_test_enable(true)
                .front(stencil_face_to_vk(front))
                .back(stencil_face_to_vk(back));
        }

        let blend_attachments = [blend_to_vk(&desc.blend)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR, vk::DynamicState::DEPTH_BIAS];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(to_vk(desc.layout.0))
            .render_pass(to_vk(desc.render_pass.0))
            .subpass(0);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, e)| vk_err("compile a graphics pipeline", e))?
        };
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| Error::BackendError("driver returned no pipeline".to_string()))?;
        Ok(PipelineHandle(pipeline.as_raw()))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        unsafe { self.device.destroy_pipeline(to_vk(pipeline.0), None) }
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(
        &mut self,
        kind: DescriptorKind,
        stages: ShaderStages,
    ) -> Result<DescriptorSetLayoutHandle> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(descriptor_type_to_vk(kind))
            .descriptor_count(1)
            .stage_flags(shader_stages_to_vk(stages))];
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .map_err(|e| vk_err("create a descriptor set layout", e))?;
        self.set_layouts.insert(layout.as_raw(), kind);
        Ok(DescriptorSetLayoutHandle(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) {
        self.set_layouts.remove(&layout.0);
        unsafe { self.device.destroy_descriptor_set_layout(to_vk(layout.0), None) }
    }

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let sizes: Vec<vk::DescriptorPoolSize> = [
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, desc.uniform_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, desc.storage_dynamic),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, desc.image_samplers),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect();
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(desc.max_sets)
            .pool_sizes(&sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&info, None) }
            .map_err(|e| vk_err("create a descriptor pool", e))?;
        Ok(DescriptorPoolHandle(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        let pool: vk::DescriptorPool = to_vk(pool.0);
        self.sets.retain(|_, record| record.pool != pool);
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        let kind = *self
            .set_layouts
            .get(&layout.0)
            .ok_or_else(|| Error::InvalidResource(format!("unknown set layout {:#x}", layout.0)))?;
        let vk_pool: vk::DescriptorPool = to_vk(pool.0);
        let layouts = [to_vk::<vk::DescriptorSetLayout>(layout.0)];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk_pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }.map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                Error::CapacityExceeded("descriptor pool exhausted".to_string())
            }
            other => vk_err("allocate a descriptor set", other),
        })?;
        let set = sets
            .first()
            .copied()
            .ok_or_else(|| Error::BackendError("driver returned no descriptor set".to_string()))?;
        self.sets.insert(set.as_raw(), SetRecord { kind, pool: vk_pool });
        Ok(DescriptorSetHandle(set.as_raw()))
    }

    fn free_descriptor_set(&mut self, pool: DescriptorPoolHandle, set: DescriptorSetHandle) {
        self.sets.remove(&set.0);
        let sets = [to_vk::<vk::DescriptorSet>(set.0)];
        if let Err(e) = unsafe { self.device.free_descriptor_sets(to_vk(pool.0), &sets) } {
            engine_warn!("arena::vulkan", "Failed to free descriptor set: {:?}", e);
        }
    }

    fn write_image_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        view: ImageViewHandle,
        sampler: SamplerHandle,
    ) -> Result<()> {
        match self.sets.get(&set.0) {
            Some(record) if record.kind == DescriptorKind::CombinedImageSampler => {}
            Some(record) => {
                return Err(Error::InvalidResource(format!("image write to a {:?} set", record.kind)));
            }
            None => return Err(Error::InvalidResource(format!("unknown descriptor set {:#x}", set.0))),
        }
        let image_info = [vk::DescriptorImageInfo {
            sampler: to_vk(sampler.0),
            image_view: to_vk(view.0),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(to_vk(set.0))
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn write_buffer_descriptor(&mut self, set: DescriptorSetHandle, buffer: BufferHandle, range: u64) -> Result<()> {
        let record = *self
            .sets
            .get(&set.0)
            .ok_or_else(|| Error::InvalidResource(format!("unknown descriptor set {:#x}", set.0)))?;
        if record.kind == DescriptorKind::CombinedImageSampler {
            return Err(Error::InvalidResource("buffer write to an image sampler set".to_string()));
        }
        let buffer_info = [vk::DescriptorBufferInfo { buffer: self.host_buffer(buffer)?.buffer, offset: 0, range }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(to_vk(set.0))
            .dst_binding(0)
            .descriptor_type(descriptor_type_to_vk(record.kind))
            .buffer_info(&buffer_info);
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let address = address_mode_to_vk(desc.address_mode);
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_filter))
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .anisotropy_enable(desc.max_anisotropy > 0)
            .max_anisotropy(desc.max_anisotropy.max(1) as f32)
            .min_lod(0.0)
            .max_lod(desc.max_lod as f32)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
        let sampler =
            unsafe { self.device.create_sampler(&info, None) }.map_err(|e| vk_err("create a sampler", e))?;
        Ok(SamplerHandle(sampler.as_raw()))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        unsafe { self.device.destroy_sampler(to_vk(sampler.0), None) }
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| vk_err("create a fence", e))?;
        Ok(FenceHandle(fence.as_raw()))
    }

    fn wait_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<FenceStatus> {
        match unsafe { self.device.wait_for_fences(&[to_vk(fence.0)], true, timeout_ns) } {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::Timeout),
            Err(e) => Err(vk_err("wait for a fence", e)),
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        unsafe { self.device.reset_fences(&[to_vk(fence.0)]) }.map_err(|e| vk_err("reset a fence", e))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(to_vk(fence.0), None) }
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| vk_err("create a semaphore", e))?;
        Ok(SemaphoreHandle(semaphore.as_raw()))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(to_vk(semaphore.0), None) }
    }

    // ===== COMMANDS =====

    fn allocate_command_buffer(&mut self) -> Result<CommandBufferHandle> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| vk_err("allocate a command buffer", e))?;
        buffers
            .first()
            .map(|cmd| CommandBufferHandle(cmd.as_raw()))
            .ok_or_else(|| Error::BackendError("driver returned no command buffer".to_string()))
    }

    fn free_command_buffer(&mut self, cmd: CommandBufferHandle) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[to_vk(cmd.0)]) }
    }

    fn begin_command_buffer(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        let cmd: vk::CommandBuffer = to_vk(cmd.0);
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_err("reset a command buffer", e))?;
            let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(cmd, &info)
                .map_err(|e| vk_err("begin a command buffer", e))
        }
    }

    fn end_command_buffer(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe { self.device.end_command_buffer(to_vk(cmd.0)) }.map_err(|e| vk_err("end a command buffer", e))
    }

    fn record(&mut self, cmd: CommandBufferHandle, command: &Command) -> Result<()> {
        if let Command::BeginRenderPass { render_pass, .. } = command {
            self.pass_has_stencil = self.stencil_passes.get(&render_pass.0).copied().unwrap_or(false);
        }
        self.record_command(to_vk(cmd.0), command)
    }

    fn submit(&mut self, cmd: CommandBufferHandle, sync: &SubmitSync) -> Result<()> {
        let command_buffers = [to_vk::<vk::CommandBuffer>(cmd.0)];
        let (wait_semaphores, wait_stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) = sync
            .wait
            .iter()
            .map(|&(semaphore, stages)| (to_vk::<vk::Semaphore>(semaphore.0), pipeline_stages_to_vk(stages)))
            .unzip();
        let signal_semaphores: Vec<vk::Semaphore> = sync.signal.iter().map(|s| to_vk(s.0)).collect();
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        let fence = sync.fence.map(|f| to_vk(f.0)).unwrap_or_else(vk::Fence::null);
        unsafe { self.device.queue_submit(self.queue, &[info], fence) }.map_err(|e| vk_err("submit commands", e))
    }
}

/// Specialization map entries and packed data for 32-bit constants
pub(crate) fn specialization(constants: &[SpecializationConstant]) -> (Vec<vk::SpecializationMapEntry>, Vec<u8>) {
    let entries = constants
        .iter()
        .enumerate()
        .map(|(i, c)| vk::SpecializationMapEntry { constant_id: c.id, offset: (i * 4) as u32, size: 4 })
        .collect();
    let data = constants.iter().flat_map(|c| c.value.to_ne_bytes()).collect();
    (entries, data)
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
