/*!
# Arena Render - Vulkan Driver

Vulkan implementation of the `GpuDevice` seam used by `arena_render`.

The driver is built on ash for the Vulkan bindings and gpu-allocator for
host-visible buffers. Shader modules are checked with spirq before they
reach the driver. Validation layers are compiled in only with the
`vulkan-validation` feature.

```no_run
use arena_render::arena::{Backend, Config, DirectoryShaderSource};
use arena_render_vulkan::{window_extent, VulkanDevice};

fn start(window: &winit::window::Window) -> arena_render::arena::Result<Backend<VulkanDevice>> {
    let config = Config::default();
    let device = VulkanDevice::new(window, &config)?;
    let shaders = Box::new(DirectoryShaderSource::new("shaders"));
    Backend::init(device, shaders, &config, window_extent(window))
}
```
*/

mod convert;
mod debug;
mod reflect;
mod instance;
mod device;
mod commands;

pub use device::VulkanDevice;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationSeverity, ValidationStats};

/// Drawable size of a window, the extent the backend renders at
pub fn window_extent(window: &winit::window::Window) -> arena_render::device::Extent2D {
    let size = window.inner_size();
    arena_render::device::Extent2D::new(size.width, size.height)
}
