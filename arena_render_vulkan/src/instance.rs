//! Instance, surface and physical device setup
//!
//! Adapters are described with the backend's `AdapterInfo` so the choice of
//! device and queue family goes through the shared selection rules.

use arena_render::arena::{Config, Error, Result};
use arena_render::device::*;
use arena_render::{engine_error, engine_info, engine_warn};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;

use crate::convert::*;

/// Log a startup failure and wrap it
pub(crate) fn init_failed(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("arena::vulkan", "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("failed to {}: {:?}", what, e))
}

/// Instance-level objects, destroyed in reverse order by `destroy`
pub(crate) struct InstanceObjects {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl InstanceObjects {
    pub unsafe fn create<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        let entry = ash::Entry::load().map_err(|e| init_failed("load the Vulkan library", e))?;

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Arena Render")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let display_handle = window.display_handle().map_err(|e| init_failed("get the display handle", e))?;
        let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| init_failed("query surface extensions", e))?
            .to_vec();

        let validation = validation_requested(config);
        let mut layer_names = Vec::new();
        if validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);
        let instance = entry
            .create_instance(&create_info, None)
            .map_err(|e| init_failed("create the Vulkan instance", e))?;

        let debug = if validation {
            match create_messenger(&entry, &instance) {
                Ok(debug) => Some(debug),
                Err(err) => {
                    instance.destroy_instance(None);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = window
            .window_handle()
            .map_err(|e| init_failed("get the window handle", e))
            .and_then(|window_handle| {
                ash_window::create_surface(&entry, &instance, display_handle.as_raw(), window_handle.as_raw(), None)
                    .map_err(|e| init_failed("create the window surface", e))
            });

        let mut objects = Self { entry, instance, debug, surface_loader, surface: vk::SurfaceKHR::null() };
        match surface {
            Ok(surface) => {
                objects.surface = surface;
                Ok(objects)
            }
            Err(err) => {
                objects.destroy();
                Err(err)
            }
        }
    }

    pub unsafe fn destroy(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(self.surface, None);
            self.surface = vk::SurfaceKHR::null();
        }
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }

    /// Every physical device, described for the selection rules
    pub unsafe fn enumerate_adapters(&self) -> Result<Vec<(vk::PhysicalDevice, AdapterInfo)>> {
        let devices = self
            .instance
            .enumerate_physical_devices()
            .map_err(|e| init_failed("enumerate physical devices", e))?;

        let mut adapters = Vec::with_capacity(devices.len());
        for physical_device in devices {
            let properties = self.instance.get_physical_device_properties(physical_device);
            let name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown device".to_string());

            let queue_families = self
                .instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .enumerate()
                .map(|(index, family)| QueueFamilyInfo {
                    index: index as u32,
                    graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present: self
                        .surface_loader
                        .get_physical_device_surface_support(physical_device, index as u32, self.surface)
                        .unwrap_or(false),
                    queue_count: family.queue_count,
                })
                .collect();

            let swapchain_extension = self
                .instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default()
                .iter()
                .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));

            let supported = self.instance.get_physical_device_features(physical_device);
            adapters.push((
                physical_device,
                AdapterInfo {
                    name,
                    adapter_type: adapter_type_from_vk(properties.device_type),
                    queue_families,
                    features: features_from_vk(&supported),
                    swapchain_extension,
                },
            ));
        }
        Ok(adapters)
    }

    /// Formats, limits and memory types of the chosen device
    pub unsafe fn capabilities(&self, physical_device: vk::PhysicalDevice, adapter: &AdapterInfo) -> DeviceCapabilities {
        let properties = self.instance.get_physical_device_properties(physical_device);
        let limits = &properties.limits;
        let memory = self.instance.get_physical_device_memory_properties(physical_device);

        let optimal_features = |format: Format| {
            self.instance
                .get_physical_device_format_properties(physical_device, format_to_vk(format))
                .optimal_tiling_features
        };
        let depth_formats = DEPTH_CANDIDATES
            .iter()
            .copied()
            .filter(|&f| optimal_features(f).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT))
            .collect();
        let hdr_color = optimal_features(Format::R16G16B16A16_SFLOAT)
            .contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND);

        DeviceCapabilities {
            adapter_name: adapter.name.clone(),
            adapter_type: adapter.adapter_type,
            features: adapter.features,
            limits: DeviceLimits {
                max_image_dimension_2d: limits.max_image_dimension2_d,
                max_sampler_anisotropy: limits.max_sampler_anisotropy,
                min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
                max_push_constants_size: limits.max_push_constants_size,
                line_width_range: limits.line_width_range,
                framebuffer_color_samples: sample_counts_from_vk(limits.framebuffer_color_sample_counts),
                framebuffer_depth_samples: sample_counts_from_vk(limits.framebuffer_depth_sample_counts),
            },
            memory_types: memory
                .memory_types_as_slice()
                .iter()
                .map(|t| MemoryType {
                    properties: memory_properties_from_vk(t.property_flags),
                    heap_index: t.heap_index,
                })
                .collect(),
            depth_formats,
            hdr_color,
        }
    }

    /// Logical device with one queue and every optional feature the adapter has
    pub unsafe fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        features: &DeviceFeatures,
    ) -> Result<ash::Device> {
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];
        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let enabled = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(features.fill_mode_non_solid)
            .wide_lines(features.wide_lines)
            .sampler_anisotropy(features.sampler_anisotropy)
            .fragment_stores_and_atomics(features.fragment_stores_and_atomics)
            .depth_clamp(features.depth_clamp)
            .sample_rate_shading(features.sample_rate_shading);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&enabled);
        self.instance
            .create_device(physical_device, &create_info, None)
            .map_err(|e| init_failed("create the logical device", e))
    }
}

pub(crate) fn features_from_vk(features: &vk::PhysicalDeviceFeatures) -> DeviceFeatures {
    DeviceFeatures {
        fill_mode_non_solid: features.fill_mode_non_solid == vk::TRUE,
        wide_lines: features.wide_lines == vk::TRUE,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        fragment_stores_and_atomics: features.fragment_stores_and_atomics == vk::TRUE,
        depth_clamp: features.depth_clamp == vk::TRUE,
        sample_rate_shading: features.sample_rate_shading == vk::TRUE,
    }
}

fn validation_requested(config: &Config) -> bool {
    if config.enable_validation && !cfg!(feature = "vulkan-validation") {
        engine_warn!(
            "arena::vulkan",
            "Validation requested but the driver was built without the vulkan-validation feature"
        );
    }
    config.enable_validation && cfg!(feature = "vulkan-validation")
}

#[cfg(feature = "vulkan-validation")]
unsafe fn create_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    use crate::debug::{reset_validation_stats, severity_flags, vulkan_debug_callback, ValidationSeverity};

    reset_validation_stats();
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity_flags(ValidationSeverity::default()))
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));
    let messenger = loader
        .create_debug_utils_messenger(&info, None)
        .map_err(|e| init_failed("create the debug messenger", e))?;
    engine_info!("arena::vulkan", "Validation layers enabled");
    Ok((loader, messenger))
}

#[cfg(not(feature = "vulkan-validation"))]
unsafe fn create_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    Err(Error::Unsupported("built without the vulkan-validation feature".to_string()))
}
