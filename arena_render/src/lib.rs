/*!
# Arena Render

Frame-pipelined rendering backend for an arena shooter renderer.

The crate owns everything between the front-end's draw lists and a
graphics device: swapchain and render targets, the pipeline cache,
descriptor binding, the per-frame geometry buffer, texture memory,
post-processing and screenshots. Drivers plug in through the `GpuDevice`
trait; `arena_render_vulkan` provides the Vulkan one.

## Architecture

- **Backend**: init/shutdown, frame protocol and the draw calls
- **GpuDevice**: the device seam, one method per driver operation
- **PipelineCache**: pipeline definitions compiled lazily per render pass
- **RenderTargets**: swapchain, attachments, passes and framebuffers of one
  surface epoch
- **GeometryBuffer**: per-slot host buffer for vertices, indices, uniforms
- **TextureArena**: chunk-allocated images with their sampler descriptors
*/

// Internal modules
mod error;
pub mod log;
pub mod config;
pub mod device;
pub mod memory;
pub mod render_pass;
pub mod swapchain;
pub mod pipeline;
pub mod descriptors;
pub mod transfer;
pub mod texture;
pub mod material;
pub mod scene;
pub mod frame;
pub mod draw;
pub mod stats;
pub mod backend;

// Error types at the root for the logging macros
pub use error::{Error, Result};

#[cfg(test)]
mod test_support;

// Main arena namespace module
pub mod arena {
    // Error types
    pub use crate::error::{Error, Result};

    // Entry point
    pub use crate::backend::{Backend, Screenshot, MAX_FLARE_QUERIES};
    pub use crate::config::{Config, PresentModePreference, TextureFilter};
    pub use crate::frame::FrameRequest;
    pub use crate::draw::{MaterialDraw, VertexData};
    pub use crate::stats::BackendStats;
    pub use crate::pipeline::{DirectoryShaderSource, MemoryShaderSource, ShaderSource};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
    }

    // Device seam
    pub mod device {
        pub use crate::device::*;
    }

    // Pipeline definitions and the built-in set
    pub mod pipeline {
        pub use crate::pipeline::{
            AlphaTest, BlendDst, BlendSrc, BuiltinPipelines, CullType, DepthFunc, PipelineDefinition,
            PipelineIndex, ShaderPermutation, ShadowPhase, StateBits, Topology,
        };
    }

    // Materials and per-draw data
    pub mod material {
        pub use crate::material::*;
        pub use crate::scene::*;
    }

    // Textures
    pub mod texture {
        pub use crate::texture::{TextureDesc, TextureId, WrapMode, full_mip_count};
        pub use crate::transfer::MipData;
    }
}

// Re-export math library at crate root
pub use glam;
