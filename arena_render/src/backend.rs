//! Backend facade
//!
//! `Backend` owns the device and, between `init` and `shutdown`, one
//! `Session`: every device object the renderer uses. Components receive the
//! session's objects explicitly; nothing is reached through globals.
//!
//! All methods are called from one thread. Fatal conditions come back as
//! `Err`; surface loss and geometry overflow are handled internally.

use crate::config::{Config, TextureFilter};
use crate::descriptors::{DescriptorLayouts, DescriptorSlot, DescriptorState};
use crate::device::*;
use crate::error::{Error, Result};
use crate::frame::{FrameRecord, FrameSlot, FrameRequest, FRAME_SLOTS};
use crate::draw::{MaterialDraw, VertexData};
use crate::material::{Material, MaterialVariant};
use crate::memory::{GeometryBuffer, GeometryBufferDesc};
use crate::pipeline::*;
use crate::scene::{DepthRange, UniformBlock, UNIFORM_RANGE};
use crate::stats::BackendStats;
use crate::swapchain::{RenderTargets, TargetParams};
use crate::texture::{TextureArena, TextureArenaDesc, TextureDesc, TextureId};
use crate::transfer::{MipData, TransferContext};
use crate::{engine_info, engine_warn};

use glam::Mat4;

/// Flare visibility queries the storage buffer has room for
pub const MAX_FLARE_QUERIES: u32 = 256;

/// Read-back of the last presented frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// Top-down rows of RGBA8
    pub pixels: Vec<u8>,
}

/// Host storage buffer fragment programs write flare visibility into.
/// Each frame slot owns `MAX_FLARE_QUERIES` entries.
pub(crate) struct FlareStorage {
    pub buffer: BufferHandle,
    pub set: DescriptorSetHandle,
    /// Distance between two query slots, a legal dynamic offset step
    pub stride: u64,
}

impl FlareStorage {
    pub fn offset(&self, slot: usize, index: u32) -> u64 {
        (slot as u64 * MAX_FLARE_QUERIES as u64 + index as u64) * self.stride
    }
}

/// Every device object of one init..shutdown span
pub(crate) struct Session {
    pub config: Config,
    pub context: DeviceContext,
    pub window_extent: Extent2D,
    pub minimized: bool,
    /// Window size changed; rebuild before the next frame
    pub resize_pending: bool,
    /// Acquire or present reported a stale surface; rebuild after presenting
    pub restart_after_present: bool,

    pub layouts: DescriptorLayouts,
    pub shaders: ShaderLibrary,
    /// Linear clamp sampler of the post-process sets
    pub post_sampler: SamplerHandle,
    /// Geometry uniform sets and the flare storage set
    pub pool: DescriptorPoolHandle,
    pub flares: FlareStorage,
    pub geometry: GeometryBuffer,
    pub transfer: TransferContext,
    pub textures: TextureArena,
    pub white: TextureId,
    pub pipelines: PipelineCache,
    pub builtins: Option<BuiltinPipelines>,
    pub world_active: bool,
    pub targets: RenderTargets,
    pub post: PostProcess,
    pub descriptors: DescriptorState,

    pub slots: Vec<FrameSlot>,
    pub current_slot: usize,
    pub frame: Option<FrameRecord>,
    /// Image submitted by `end_frame`, waiting for `present_frame`
    pub pending_present: Option<u32>,
    pub last_presented: Option<u32>,
    pub stats: BackendStats,
}

/// Compile context for the current render targets
pub(crate) fn pipeline_context<'a>(
    shaders: &'a ShaderLibrary,
    layouts: &DescriptorLayouts,
    targets: &RenderTargets,
    context: &DeviceContext,
) -> PipelineContext<'a> {
    PipelineContext {
        shaders,
        layout: layouts.main,
        targets: targets.pass_targets(context.samples),
        wide_lines: context.wide_lines,
        depth_clamp: context.depth_clamp,
        stencil: context.depth_format.has_stencil(),
    }
}

pub(crate) fn no_frame() -> Error {
    Error::InvalidResource("no frame is being recorded".to_string())
}

impl Session {
    pub fn new(device: &mut dyn GpuDevice, source: &dyn ShaderSource, config: &Config, window: Extent2D) -> Result<Self> {
        let config = config.sanitized();
        let context = DeviceContext::new(device, &config)?;
        let mut session = Self {
            config,
            context,
            window_extent: window,
            minimized: window.is_empty(),
            resize_pending: false,
            restart_after_present: false,
            layouts: DescriptorLayouts::empty(),
            shaders: ShaderLibrary::empty(),
            post_sampler: SamplerHandle::NULL,
            pool: DescriptorPoolHandle::NULL,
            flares: FlareStorage { buffer: BufferHandle::NULL, set: DescriptorSetHandle::NULL, stride: 0 },
            geometry: GeometryBuffer::empty(),
            transfer: TransferContext::empty(),
            textures: TextureArena::empty(),
            white: TextureId::default(),
            pipelines: PipelineCache::new(),
            builtins: None,
            world_active: false,
            targets: RenderTargets::empty(),
            post: PostProcess::empty(),
            descriptors: DescriptorState::new(DescriptorSetHandle::NULL),
            slots: Vec::with_capacity(FRAME_SLOTS),
            current_slot: 0,
            frame: None,
            pending_present: None,
            last_presented: None,
            stats: BackendStats::default(),
        };
        match session.populate(device, source) {
            Ok(()) => Ok(session),
            Err(err) => {
                session.destroy(device);
                Err(err)
            }
        }
    }

    fn populate(&mut self, device: &mut dyn GpuDevice, source: &dyn ShaderSource) -> Result<()> {
        self.layouts = DescriptorLayouts::create(device)?;
        self.shaders = ShaderLibrary::load(device, source)?;
        self.post_sampler = device.create_sampler(&SamplerDesc {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Nearest,
            address_mode: AddressMode::ClampToEdge,
            max_anisotropy: 0,
            max_lod: 0,
        })?;

        self.pool = device.create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: FRAME_SLOTS as u32 + 1,
            uniform_dynamic: FRAME_SLOTS as u32,
            storage_dynamic: 1,
            image_samplers: 0,
        })?;
        self.create_flare_storage(device)?;
        self.geometry = GeometryBuffer::new(
            device,
            GeometryBufferDesc {
                slot_count: FRAME_SLOTS,
                capacity: self.config.geometry_buffer_size,
                uniform_alignment: self.context.uniform_alignment,
                uniform_range: UNIFORM_RANGE,
                descriptor_pool: self.pool,
                uniform_layout: self.layouts.uniform,
            },
        )?;

        self.transfer = TransferContext::new(device)?;
        self.textures = TextureArena::new(
            device,
            &TextureArenaDesc {
                chunk_size: self.config.image_chunk_size,
                filter: self.config.texture_filter,
                anisotropy: self.context.anisotropy,
                sampler_layout: self.layouts.sampler,
            },
        )?;
        self.white = self.create_white_image(device)?;
        self.descriptors = DescriptorState::new(self.textures.descriptor(self.white)?);

        for _ in 0..FRAME_SLOTS {
            let slot = FrameSlot::create(device)?;
            self.slots.push(slot);
        }

        self.targets = RenderTargets::build(device, &self.target_params())?;
        self.post = PostProcess::build(device, &self.shaders, self.layouts.post, &self.targets, &self.post_params())?;
        let ctx = pipeline_context(&self.shaders, &self.layouts, &self.targets, &self.context);
        self.builtins = Some(BuiltinPipelines::register(&mut self.pipelines, device, &ctx)?);
        self.pipelines.mark_world_base();
        self.stats.pipelines_compiled = self.pipelines.compiled_count();

        engine_info!(
            "arena::backend",
            "Backend ready: {} frame slots, {} KiB geometry per slot, {} built-in pipelines",
            FRAME_SLOTS,
            self.geometry.capacity() / 1024,
            self.pipelines.len()
        );
        Ok(())
    }

    fn create_flare_storage(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        let stride = self.context.uniform_alignment;
        self.flares.stride = stride;
        let size = stride * MAX_FLARE_QUERIES as u64 * FRAME_SLOTS as u64;
        self.flares.buffer = device.create_host_buffer(size, BufferUsage::STORAGE)?;
        self.flares.set = device.allocate_descriptor_set(self.pool, self.layouts.storage)?;
        device.write_buffer_descriptor(self.flares.set, self.flares.buffer, 4)
    }

    fn create_white_image(&mut self, device: &mut dyn GpuDevice) -> Result<TextureId> {
        const SIZE: u32 = 8;
        let id = self.textures.create(
            device,
            TextureDesc { filter: Some(TextureFilter::GL_LINEAR), ..TextureDesc::new("*white", SIZE, SIZE) },
        )?;
        let pixels = vec![0xFF; (SIZE * SIZE * 4) as usize];
        self.textures.upload(
            device,
            &mut self.transfer,
            id,
            &[MipData { width: SIZE, height: SIZE, data: &pixels }],
            None,
        )?;
        Ok(id)
    }

    pub fn target_params(&self) -> TargetParams<'_> {
        TargetParams {
            context: &self.context,
            config: &self.config,
            window_extent: self.window_extent,
            sampler_layout: self.layouts.sampler,
            sampler: self.post_sampler,
        }
    }

    pub fn post_params(&self) -> PostParams {
        PostParams {
            gamma: self.config.gamma,
            overbright_bits: self.config.overbright_bits,
            bloom_threshold: self.config.bloom_threshold,
        }
    }

    pub fn cmd(&self, frame: &FrameRecord) -> CommandBufferHandle {
        self.slots.get(frame.slot).map(|s| s.cmd).unwrap_or(CommandBufferHandle::NULL)
    }

    // ===== RESOURCES =====

    pub fn create_image(&mut self, device: &mut dyn GpuDevice, desc: TextureDesc) -> Result<TextureId> {
        self.textures.create(device, desc)
    }

    pub fn upload_image_data(
        &mut self,
        device: &mut dyn GpuDevice,
        id: TextureId,
        mips: &[MipData<'_>],
        offset: Option<(i32, i32)>,
    ) -> Result<()> {
        self.textures.upload(device, &mut self.transfer, id, mips, offset)
    }

    /// The device must not use the texture any more
    pub fn release_image(&mut self, device: &mut dyn GpuDevice, id: TextureId) -> Result<()> {
        if id == self.white {
            return Err(Error::InvalidResource("the white image cannot be released".to_string()));
        }
        device.wait_idle()?;
        self.textures.release(device, id)
    }

    pub fn begin_world(&mut self) {
        if !self.world_active {
            self.world_active = true;
            self.pipelines.mark_world_base();
            self.textures.begin_world();
            engine_info!("arena::backend", "World begins at {} pipelines", self.pipelines.len());
        }
    }

    pub fn release_world(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidResource("cannot release the world while recording".to_string()));
        }
        if !self.world_active {
            return Ok(());
        }
        device.wait_idle()?;
        self.textures.release_world(device);
        self.pipelines.release_world(device);
        self.world_active = false;
        Ok(())
    }

    pub fn flare_query(&mut self, device: &mut dyn GpuDevice, index: u32) -> Result<()> {
        if index >= MAX_FLARE_QUERIES {
            return Err(Error::InvalidResource(format!("flare query {} out of range", index)));
        }
        let offset = self.flares.offset(self.current_slot, index);
        device.write_buffer(self.flares.buffer, offset, &0u32.to_le_bytes())?;
        self.descriptors.set_storage_offset(offset as u32);
        Ok(())
    }

    /// Result of query `index` as written by the previously submitted
    /// frame, valid once that frame completed
    pub fn flare_visible(&self, device: &dyn GpuDevice, index: u32) -> Result<bool> {
        if index >= MAX_FLARE_QUERIES {
            return Err(Error::InvalidResource(format!("flare query {} out of range", index)));
        }
        let previous = (self.current_slot + FRAME_SLOTS - 1) % FRAME_SLOTS;
        let mut word = [0u8; 4];
        device.read_buffer(self.flares.buffer, self.flares.offset(previous, index), &mut word)?;
        Ok(u32::from_le_bytes(word) != 0)
    }

    pub fn read_pixels(&mut self, device: &mut dyn GpuDevice) -> Result<Screenshot> {
        if self.frame.is_some() {
            return Err(Error::InvalidResource("cannot read pixels while recording".to_string()));
        }
        let image = self
            .last_presented
            .ok_or_else(|| Error::InvalidResource("no frame has been presented".to_string()))?;
        device.wait_idle()?;
        let (source, layout, format) = self.targets.readback_source(image)?;
        let extent = self.targets.window_extent();
        let pixels = self.transfer.read_image(device, source, layout, format, extent)?;
        Ok(Screenshot { width: extent.width, height: extent.height, pixels })
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            pipelines_compiled: self.pipelines.compiled_count(),
            geometry_capacity: self.geometry.capacity(),
            image_chunks: self.textures.chunk_count(),
            textures: self.textures.len(),
            ..self.stats
        }
    }

    /// Release everything, in reverse creation order
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Err(err) = device.wait_idle() {
            engine_warn!("arena::backend", "wait_idle failed during shutdown: {}", err);
        }
        self.frame = None;
        self.pending_present = None;
        self.pipelines.destroy(device);
        self.builtins = None;
        self.post.destroy(device);
        self.targets.destroy(device);
        for mut slot in self.slots.drain(..) {
            slot.destroy(device);
        }
        self.textures.destroy(device);
        self.transfer.destroy(device);
        self.geometry.destroy(device);
        if !self.flares.buffer.is_null() {
            device.destroy_buffer(self.flares.buffer);
            self.flares.buffer = BufferHandle::NULL;
        }
        if !self.pool.is_null() {
            device.destroy_descriptor_pool(self.pool);
            self.pool = DescriptorPoolHandle::NULL;
        }
        if !self.post_sampler.is_null() {
            device.destroy_sampler(self.post_sampler);
            self.post_sampler = SamplerHandle::NULL;
        }
        self.shaders.destroy(device);
        self.layouts.destroy(device);
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// Rendering backend over a graphics device
///
/// # Example
///
/// ```no_run
/// use arena_render::arena::{Backend, Config, FrameRequest, DirectoryShaderSource};
/// use arena_render::arena::device::{Extent2D, GpuDevice};
///
/// fn run<D: GpuDevice>(device: D) -> arena_render::arena::Result<()> {
///     let shaders = Box::new(DirectoryShaderSource::new("shaders"));
///     let mut backend = Backend::init(device, shaders, &Config::default(), Extent2D::new(1280, 720))?;
///     backend.begin_frame(FrameRequest::default())?;
///     backend.clear_color([0.0, 0.0, 0.0, 1.0])?;
///     backend.end_frame()?;
///     backend.present_frame()?;
///     backend.shutdown();
///     Ok(())
/// }
/// ```
pub struct Backend<D: GpuDevice> {
    device: D,
    shader_source: Box<dyn ShaderSource>,
    session: Option<Session>,
    window_extent: Extent2D,
}

impl<D: GpuDevice> Backend<D> {
    /// Build a session on `device`. Unsupported devices fail here.
    pub fn init(device: D, shader_source: Box<dyn ShaderSource>, config: &Config, window: Extent2D) -> Result<Self> {
        let mut backend = Self { device, shader_source, session: None, window_extent: window };
        backend.start(config)?;
        Ok(backend)
    }

    fn start(&mut self, config: &Config) -> Result<()> {
        let session = Session::new(&mut self.device, self.shader_source.as_ref(), config, self.window_extent)?;
        self.session = Some(session);
        Ok(())
    }

    fn parts(&mut self) -> Result<(&mut Session, &mut dyn GpuDevice)> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::InvalidResource("backend is shut down".to_string()))?;
        Ok((session, &mut self.device))
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("backend is shut down".to_string()))
    }

    /// Destroy every device object. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy(&mut self.device);
            engine_info!("arena::backend", "Backend shut down after {} frames", session.stats.frames);
        }
    }

    /// Tear down and rebuild all device state with new options. Texture ids
    /// and pipeline indices from the old session become invalid.
    pub fn reinitialize(&mut self, config: &Config) -> Result<()> {
        self.shutdown();
        self.start(config)
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Options of the running session, after clamping
    pub fn config(&self) -> Option<&Config> {
        self.session.as_ref().map(|s| &s.config)
    }

    pub fn context(&self) -> Option<&DeviceContext> {
        self.session.as_ref().map(|s| &s.context)
    }

    pub fn stats(&self) -> BackendStats {
        self.session.as_ref().map(Session::stats).unwrap_or_default()
    }

    // ===== SURFACE =====

    /// Window size changed; zero in either dimension means minimized
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_extent = Extent2D::new(width, height);
        if let Some(session) = self.session.as_mut() {
            session.resize(self.window_extent);
        }
    }

    /// Rebuild every surface-dependent object now, or on the next frame
    /// with a non-empty window if currently minimized
    pub fn restart(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        if session.frame.is_some() {
            return Err(Error::InvalidResource("cannot restart while recording".to_string()));
        }
        session.restart(device)
    }

    /// Size of the presented images
    pub fn window_extent(&self) -> Extent2D {
        self.session
            .as_ref()
            .map(|s| s.targets.window_extent())
            .unwrap_or_default()
    }

    /// Size of the scene attachments
    pub fn render_extent(&self) -> Extent2D {
        self.session.as_ref().map(|s| s.targets.render_extent).unwrap_or_default()
    }

    // ===== FRAMES =====

    pub fn begin_frame(&mut self, request: FrameRequest) -> Result<()> {
        let (session, device) = self.parts()?;
        session.begin_frame(device, request)
    }

    /// Leave the screen-map pass and start the scene
    pub fn begin_main_pass(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.begin_main_pass(device)
    }

    /// Run bloom over the finished scene; later draws land on top of it
    pub fn finish_scene(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.finish_scene(device)
    }

    pub fn end_frame(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.end_frame(device)
    }

    pub fn present_frame(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.present_frame(device)
    }

    // ===== DRAWING =====

    pub fn bind_pipeline(&mut self, pipeline: PipelineIndex) -> Result<()> {
        let (session, device) = self.parts()?;
        session.bind_pipeline(device, pipeline)
    }

    /// Upload and bind vertex streams; `false` when the geometry buffer is full
    pub fn bind_geometry(&mut self, data: &VertexData<'_>) -> Result<bool> {
        let (session, device) = self.parts()?;
        session.bind_geometry(device, data)
    }

    pub fn bind_index(&mut self, indices: &[u32]) -> Result<bool> {
        let (session, device) = self.parts()?;
        session.bind_index(device, indices)
    }

    pub fn set_uniforms<T: UniformBlock>(&mut self, block: &T) -> Result<bool> {
        let (session, device) = self.parts()?;
        session.set_uniforms(device, block)
    }

    pub fn set_mvp(&mut self, mvp: &Mat4) -> Result<()> {
        let (session, device) = self.parts()?;
        session.set_mvp(device, mvp)
    }

    /// Bind `texture` to bundle slot 0..=2
    pub fn bind_texture(&mut self, bundle: usize, texture: TextureId) -> Result<()> {
        let (session, _) = self.parts()?;
        session.bind_texture(DescriptorSlot::texture(bundle), texture)
    }

    pub fn bind_fog_texture(&mut self, texture: TextureId) -> Result<()> {
        let (session, _) = self.parts()?;
        session.bind_texture(DescriptorSlot::Fog, texture)
    }

    /// Let bundle slot `bundle` fall back to the white image
    pub fn unbind_texture(&mut self, bundle: usize) -> Result<()> {
        let (session, _) = self.parts()?;
        session.descriptors.clear(DescriptorSlot::texture(bundle));
        Ok(())
    }

    pub fn set_viewport(&mut self, rect: Rect2D) -> Result<()> {
        let (session, _) = self.parts()?;
        session.set_viewport(rect)
    }

    /// Draw the bound geometry; `false` when the draw was skipped
    pub fn draw_geometry(&mut self, depth_range: DepthRange, indexed: bool) -> Result<bool> {
        let (session, device) = self.parts()?;
        session.draw_geometry(device, depth_range, indexed)
    }

    /// Draw every stage of a finalized material, returning the draws recorded
    pub fn draw_material(
        &mut self,
        material: &Material,
        variant: MaterialVariant,
        draw: &MaterialDraw<'_>,
        depth_range: DepthRange,
        time: f64,
    ) -> Result<u32> {
        let (session, device) = self.parts()?;
        session.draw_material(device, material, variant, draw, depth_range, time)
    }

    pub fn clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        let (session, device) = self.parts()?;
        session.clear_color(device, color)
    }

    pub fn clear_depth(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.clear_depth(device)
    }

    /// Reset flare query `index` and point the storage slot at it
    pub fn flare_query(&mut self, index: u32) -> Result<()> {
        let (session, device) = self.parts()?;
        session.flare_query(device, index)
    }

    pub fn flare_visible(&self, index: u32) -> Result<bool> {
        self.session()?.flare_visible(&self.device, index)
    }

    // ===== PIPELINES =====

    pub fn register_pipeline(&mut self, definition: &PipelineDefinition) -> Result<PipelineIndex> {
        let (session, _) = self.parts()?;
        session.pipelines.find_or_register(definition)
    }

    /// Register and compile for the main pass right away
    pub fn register_pipeline_now(&mut self, definition: &PipelineDefinition) -> Result<PipelineIndex> {
        let (session, device) = self.parts()?;
        let ctx = pipeline_context(&session.shaders, &session.layouts, &session.targets, &session.context);
        let index = session.pipelines.find_or_register(definition)?;
        session.pipelines.resolve(device, &ctx, index, PipelinePass::Main)?;
        Ok(index)
    }

    pub fn finalize_material(&mut self, material: &mut Material) -> Result<()> {
        let (session, _) = self.parts()?;
        material.finalize(&mut session.pipelines)
    }

    pub fn builtins(&self) -> Result<&BuiltinPipelines> {
        self.session()?
            .builtins
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("built-in pipelines missing".to_string()))
    }

    // ===== IMAGES =====

    pub fn create_image(&mut self, desc: TextureDesc) -> Result<TextureId> {
        let (session, device) = self.parts()?;
        session.create_image(device, desc)
    }

    /// Replace the image contents, or a level-0 sub-rectangle at `offset`
    pub fn upload_image_data(&mut self, id: TextureId, mips: &[MipData<'_>], offset: Option<(i32, i32)>) -> Result<()> {
        let (session, device) = self.parts()?;
        session.upload_image_data(device, id, mips, offset)
    }

    pub fn release_image(&mut self, id: TextureId) -> Result<()> {
        let (session, device) = self.parts()?;
        session.release_image(device, id)
    }

    /// Placeholder bound to texture slots nothing else was bound to
    pub fn white_image(&self) -> Option<TextureId> {
        self.session.as_ref().map(|s| s.white)
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.session.as_ref().and_then(|s| s.textures.desc(id))
    }

    // ===== WORLD =====

    /// Textures and pipelines created from now on are released by `release_world`
    pub fn begin_world(&mut self) -> Result<()> {
        let (session, _) = self.parts()?;
        session.begin_world();
        Ok(())
    }

    pub fn release_world(&mut self) -> Result<()> {
        let (session, device) = self.parts()?;
        session.release_world(device)
    }

    // ===== CAPTURE =====

    /// RGBA8 copy of the last presented frame
    pub fn read_pixels(&mut self) -> Result<Screenshot> {
        let (session, device) = self.parts()?;
        session.read_pixels(device)
    }
}

impl<D: GpuDevice> Drop for Backend<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
