//! Plain descriptions passed across the device seam
//!
//! Flag types use the same bit values as the Vulkan API so the driver can
//! convert them with `from_raw`.

use bitflags::bitflags;
use crate::device::handles::*;

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

// ============================================================================
// FORMATS
// ============================================================================

/// Pixel formats the backend creates images or attachments with
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,
    R8G8B8A8_UNORM,
    B8G8R8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_SRGB,
    A2B10G10R10_UNORM,
    R16G16B16A16_SFLOAT,
    D16_UNORM,
    D16_UNORM_S8_UINT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT,
    D32_SFLOAT_S8_UINT,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16_UNORM
                | Format::D16_UNORM_S8_UINT
                | Format::D24_UNORM_S8_UINT
                | Format::D32_SFLOAT
                | Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Format::D16_UNORM_S8_UINT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT
        )
    }

    /// Blue and red channels are swapped relative to RGBA memory order
    pub fn is_bgra(self) -> bool {
        matches!(self, Format::B8G8R8A8_UNORM | Format::B8G8R8A8_SRGB)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::D16_UNORM => 2,
            Format::D16_UNORM_S8_UINT => 4,
            Format::R16G16B16A16_SFLOAT => 8,
            Format::D32_SFLOAT_S8_UINT => 8,
            _ => 4,
        }
    }
}

/// Surface color space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    /// Any other space, raw driver value
    Other(i32),
}

/// One (format, color space) pair a surface can present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

/// Vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float2,
    Float3,
    Float4,
    /// Four normalized unsigned bytes (vertex colors)
    UByte4Norm,
}

impl VertexFormat {
    pub fn size_bytes(self) -> u32 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
            VertexFormat::UByte4Norm => 4,
        }
    }
}

// ============================================================================
// MULTISAMPLING
// ============================================================================

/// Multisample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleCount {
    S1,
    S2,
    S4,
    S8,
    S16,
    S32,
    S64,
}

impl SampleCount {
    pub const ALL: [SampleCount; 7] = [
        SampleCount::S1,
        SampleCount::S2,
        SampleCount::S4,
        SampleCount::S8,
        SampleCount::S16,
        SampleCount::S32,
        SampleCount::S64,
    ];

    pub fn count(self) -> u32 {
        1 << (self as u32)
    }

    /// Largest sample count not above `requested` (0 and 1 both mean off)
    pub fn from_requested(requested: u32) -> SampleCount {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|s| s.count() <= requested.max(1))
            .unwrap_or(SampleCount::S1)
    }

    pub fn flag(self) -> SampleCountFlags {
        SampleCountFlags::from_bits_truncate(self.count())
    }
}

bitflags! {
    /// Set of supported sample counts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SampleCountFlags: u32 {
        const TYPE_1 = 0x01;
        const TYPE_2 = 0x02;
        const TYPE_4 = 0x04;
        const TYPE_8 = 0x08;
        const TYPE_16 = 0x10;
        const TYPE_32 = 0x20;
        const TYPE_64 = 0x40;
    }
}

// ============================================================================
// USAGE AND MEMORY FLAGS
// ============================================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 0x01;
        const TRANSFER_DST = 0x02;
        const SAMPLED = 0x04;
        const STORAGE = 0x08;
        const COLOR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
        const TRANSIENT_ATTACHMENT = 0x40;
        const INPUT_ATTACHMENT = 0x80;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0x01;
        const TRANSFER_DST = 0x02;
        const UNIFORM = 0x10;
        const STORAGE = 0x20;
        const INDEX = 0x40;
        const VERTEX = 0x80;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL = 0x01;
        const HOST_VISIBLE = 0x02;
        const HOST_COHERENT = 0x04;
        const HOST_CACHED = 0x08;
        const LAZILY_ALLOCATED = 0x10;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 0x01;
        const FRAGMENT = 0x10;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 0x0001;
        const VERTEX_SHADER = 0x0008;
        const FRAGMENT_SHADER = 0x0080;
        const EARLY_FRAGMENT_TESTS = 0x0100;
        const LATE_FRAGMENT_TESTS = 0x0200;
        const COLOR_ATTACHMENT_OUTPUT = 0x0400;
        const TRANSFER = 0x1000;
        const BOTTOM_OF_PIPE = 0x2000;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 0x0020;
        const COLOR_ATTACHMENT_READ = 0x0080;
        const COLOR_ATTACHMENT_WRITE = 0x0100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x0200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x0400;
        const TRANSFER_READ = 0x0800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const MEMORY_READ = 0x8000;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u32 {
        const R = 0x1;
        const G = 0x2;
        const B = 0x4;
        const A = 0x8;
    }
}

/// Memory type as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub properties: MemoryProperties,
    pub heap_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    pub memory_type_bits: u32,
}

// ============================================================================
// IMAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    Color,
    Depth,
    DepthStencil,
}

impl ImageAspect {
    pub fn for_format(format: Format) -> ImageAspect {
        if format.has_stencil() {
            ImageAspect::DepthStencil
        } else if format.is_depth() {
            ImageAspect::Depth
        } else {
            ImageAspect::Color
        }
    }
}

/// Description of a 2D image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    /// Debug name
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub samples: SampleCount,
    pub usage: ImageUsage,
}

// ============================================================================
// RENDER PASSES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// One attachment of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Whether a dependency guards work before or after the subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyDirection {
    /// External work -> subpass 0
    Incoming,
    /// Subpass 0 -> external work
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub direction: DependencyDirection,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// Single-subpass render pass description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    /// Debug name
    pub name: &'static str,
    pub attachments: Vec<AttachmentDesc>,
    /// Index of the color attachment
    pub color: Option<u32>,
    /// Index of the depth/stencil attachment
    pub depth: Option<u32>,
    /// Index of the multisample resolve target
    pub resolve: Option<u32>,
    pub dependencies: Vec<SubpassDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<ImageViewHandle>,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// PIPELINES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndWrap,
    DecrementAndWrap,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
}

/// Stencil behaviour of one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Depth bias values come from a dynamic state command
    pub depth_bias: bool,
    pub depth_clamp: bool,
    pub line_width: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            depth_bias: false,
            depth_clamp: false,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    /// Front and back stencil state, `None` disables the stencil test
    pub stencil: Option<(StencilFaceState, StencilFaceState)>,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::LessOrEqual,
            stencil: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub write_mask: ColorMask,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            write_mask: ColorMask::all(),
        }
    }
}

/// Specialization constant, always a 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    pub id: u32,
    pub value: u32,
}

impl SpecializationConstant {
    pub fn bool(id: u32, value: bool) -> Self {
        Self { id, value: value as u32 }
    }

    pub fn float(id: u32, value: f32) -> Self {
        Self { id, value: value.to_bits() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub module: ShaderModuleHandle,
    pub specialization: Vec<SpecializationConstant>,
}

/// Complete description of one graphics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub vertex: ShaderStageDesc,
    pub fragment: ShaderStageDesc,
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
    pub topology: PrimitiveTopology,
    pub raster: RasterState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub samples: SampleCount,
    pub sample_shading: bool,
    pub layout: PipelineLayoutHandle,
    pub render_pass: RenderPassHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_size: u32,
    pub push_constant_stages: ShaderStages,
}

// ============================================================================
// DESCRIPTORS AND SAMPLERS
// ============================================================================

/// Descriptor kinds; every set layout holds exactly one binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformDynamic,
    StorageDynamic,
    CombinedImageSampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    pub max_sets: u32,
    pub uniform_dynamic: u32,
    pub storage_dynamic: u32,
    pub image_samplers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

/// Sampler description, usable as a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: AddressMode,
    /// 0 disables anisotropic filtering
    pub max_anisotropy: u32,
    /// 0 restricts sampling to the base level
    pub max_lod: u32,
}

// ============================================================================
// COMMANDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size_bytes(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Layout transition of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub aspect: ImageAspect,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub base_mip: u32,
    pub mip_count: u32,
}

/// Region of a buffer <-> image copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Everything the backend records into a command buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        area: Rect2D,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    BindPipeline(PipelineHandle),
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<(BufferHandle, u64)>,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    },
    BindDescriptorSets {
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: Vec<DescriptorSetHandle>,
        dynamic_offsets: Vec<u32>,
    },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    SetDepthBias {
        constant: f32,
        slope: f32,
    },
    PushConstants {
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
    /// Clear parts of the attachments of the current render pass
    ClearAttachments {
        color: Option<[f32; 4]>,
        depth_stencil: Option<(f32, u32)>,
        rect: Rect2D,
    },
    PipelineBarrier(ImageBarrier),
    CopyBufferToImage {
        buffer: BufferHandle,
        image: ImageHandle,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        image: ImageHandle,
        layout: ImageLayout,
        buffer: BufferHandle,
        region: BufferImageCopy,
    },
    /// Scaled copy between two color images
    BlitImage {
        src: ImageHandle,
        src_layout: ImageLayout,
        src_rect: Rect2D,
        dst: ImageHandle,
        dst_layout: ImageLayout,
        dst_rect: Rect2D,
        linear: bool,
    },
}

/// Synchronization attached to one queue submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitSync {
    pub wait: Option<(SemaphoreHandle, PipelineStages)>,
    pub signal: Option<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

// ============================================================================
// SWAPCHAIN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    FifoRelaxed,
    Fifo,
}

/// What the presentation surface supports right now
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means no limit
    pub max_image_count: u32,
    /// `None` when the surface size follows the swapchain extent
    pub current_extent: Option<Extent2D>,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    pub supported_usage: ImageUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub format: SurfaceFormat,
    pub extent: Extent2D,
    pub present_mode: PresentMode,
    pub usage: ImageUsage,
}

/// Created swapchain and its presentable images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainImages {
    pub swapchain: SwapchainHandle,
    pub images: Vec<ImageHandle>,
    pub views: Vec<ImageViewHandle>,
}
