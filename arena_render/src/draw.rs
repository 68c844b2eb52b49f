//! Draw recording: vertex streams, uniforms, textures and draw calls
//!
//! Every call records into the current frame. Streams and uniforms are
//! appended to the slot's geometry region; once it overflows, draws are
//! skipped and counted until the next frame.

use bytemuck::cast_slice;
use glam::{Mat4, Vec2, Vec4};

use crate::backend::{no_frame, pipeline_context, Session};
use crate::descriptors::DescriptorSlot;
use crate::device::*;
use crate::error::{Error, Result};
use crate::material::{Material, MaterialStage, MaterialVariant};
use crate::memory::GeometryKind;
use crate::pipeline::{PipelineIndex, PipelinePass, VertexStream};
use crate::scene::{mvp_bytes, DepthRange, UniformBlock};
use crate::texture::TextureId;
use crate::engine_trace;

/// Depth bias of polygon-offset pipelines (decals)
pub const POLYGON_OFFSET_UNITS: f32 = -2.0;
pub const POLYGON_OFFSET_FACTOR: f32 = -1.0;

/// Vertex streams of one draw; absent streams alias the positions
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexData<'a> {
    pub positions: Option<&'a [Vec4]>,
    pub normals: Option<&'a [Vec4]>,
    /// Per-bundle vertex colors
    pub colors: [Option<&'a [[u8; 4]]>; 3],
    /// Per-bundle texture coordinates
    pub tex_coords: [Option<&'a [Vec2]>; 3],
}

impl<'a> VertexData<'a> {
    fn stream(&self, stream: VertexStream) -> Option<&'a [u8]> {
        match stream {
            VertexStream::Position => self.positions.map(cast_slice),
            VertexStream::Normal => self.normals.map(cast_slice),
            VertexStream::Color0 => self.colors[0].map(cast_slice),
            VertexStream::Color1 => self.colors[1].map(cast_slice),
            VertexStream::Color2 => self.colors[2].map(cast_slice),
            VertexStream::TexCoord0 => self.tex_coords[0].map(cast_slice),
            VertexStream::TexCoord1 => self.tex_coords[1].map(cast_slice),
            VertexStream::TexCoord2 => self.tex_coords[2].map(cast_slice),
        }
    }

    fn stream_len(&self, stream: VertexStream) -> Option<usize> {
        match stream {
            VertexStream::Position => self.positions.map(<[_]>::len),
            VertexStream::Normal => self.normals.map(<[_]>::len),
            VertexStream::Color0 => self.colors[0].map(<[_]>::len),
            VertexStream::Color1 => self.colors[1].map(<[_]>::len),
            VertexStream::Color2 => self.colors[2].map(<[_]>::len),
            VertexStream::TexCoord0 => self.tex_coords[0].map(<[_]>::len),
            VertexStream::TexCoord1 => self.tex_coords[1].map(<[_]>::len),
            VertexStream::TexCoord2 => self.tex_coords[2].map(<[_]>::len),
        }
    }
}

const STREAMS: [VertexStream; VertexStream::COUNT] = [
    VertexStream::Position,
    VertexStream::Color0,
    VertexStream::TexCoord0,
    VertexStream::TexCoord1,
    VertexStream::TexCoord2,
    VertexStream::Normal,
    VertexStream::Color1,
    VertexStream::Color2,
];

/// Tessellated surface drawn with a material: shared positions and
/// indices, per-stage colors and texture coordinates
#[derive(Debug, Clone, Copy)]
pub struct MaterialDraw<'a> {
    pub positions: &'a [Vec4],
    pub normals: Option<&'a [Vec4]>,
    pub indices: &'a [u32],
    /// Stage `i` takes its colors and coordinates from `stages[i]`; missing
    /// entries draw with positions only
    pub stages: &'a [VertexData<'a>],
}

impl Session {
    fn recording(&self) -> Result<(CommandBufferHandle, PipelinePass)> {
        let frame = self.frame.as_ref().ok_or_else(no_frame)?;
        let pass = frame
            .pass
            .ok_or_else(|| Error::InvalidResource("no render pass is active".to_string()))?;
        Ok((self.cmd(frame), pass))
    }

    /// Upload and bind every stream in one call. `Ok(false)` means the
    /// geometry buffer is full and the draw must be skipped.
    pub fn bind_geometry(&mut self, device: &mut dyn GpuDevice, data: &VertexData<'_>) -> Result<bool> {
        let (cmd, _) = self.recording()?;
        let count = data
            .positions
            .map(<[_]>::len)
            .ok_or_else(|| Error::InvalidResource("vertex data without positions".to_string()))?;
        for stream in STREAMS {
            if let Some(len) = data.stream_len(stream) {
                if len != count {
                    return Err(Error::InvalidResource(format!(
                        "{:?} stream has {} vertices, positions have {}",
                        stream, len, count
                    )));
                }
            }
        }

        let mut offsets = [None; VertexStream::COUNT];
        for stream in STREAMS {
            if let Some(bytes) = data.stream(stream) {
                match self.geometry.push(device, GeometryKind::Vertex, bytes)? {
                    Some(offset) => offsets[stream.binding() as usize] = Some(offset),
                    None => return Ok(false),
                }
            }
        }

        let buffer = self.geometry.current().buffer;
        let base = offsets[VertexStream::Position.binding() as usize].unwrap_or(0);
        let buffers = offsets.iter().map(|o| (buffer, o.unwrap_or(base))).collect();
        device.record(cmd, &Command::BindVertexBuffers { first_binding: 0, buffers })?;

        let frame = self.frame.as_mut().ok_or_else(no_frame)?;
        frame.streams = offsets;
        frame.vertex_count = count as u32;
        frame.index_count = None;
        Ok(true)
    }

    pub fn bind_index(&mut self, device: &mut dyn GpuDevice, indices: &[u32]) -> Result<bool> {
        let (cmd, _) = self.recording()?;
        let Some(offset) = self.geometry.push(device, GeometryKind::Index, cast_slice(indices))? else {
            return Ok(false);
        };
        device.record(
            cmd,
            &Command::BindIndexBuffer { buffer: self.geometry.current().buffer, offset, index_type: IndexType::U32 },
        )?;
        if let Some(frame) = self.frame.as_mut() {
            frame.index_count = Some(indices.len() as u32);
        }
        Ok(true)
    }

    /// Push a uniform block and point the uniform set's dynamic offset at it
    pub fn set_uniforms<T: UniformBlock>(&mut self, device: &mut dyn GpuDevice, block: &T) -> Result<bool> {
        self.recording()?;
        match self.geometry.push(device, GeometryKind::Uniform, bytemuck::bytes_of(block))? {
            Some(offset) => {
                self.descriptors.set_uniform_offset(offset as u32);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_mvp(&mut self, device: &mut dyn GpuDevice, mvp: &Mat4) -> Result<()> {
        let (cmd, _) = self.recording()?;
        device.record(
            cmd,
            &Command::PushConstants {
                layout: self.layouts.main,
                stages: ShaderStages::VERTEX,
                offset: 0,
                data: mvp_bytes(mvp),
            },
        )
    }

    /// Bind `index` compiled for the active pass; rebinding the same
    /// pipeline records nothing
    pub fn bind_pipeline(&mut self, device: &mut dyn GpuDevice, index: PipelineIndex) -> Result<()> {
        let (cmd, pass) = self.recording()?;
        let ctx = pipeline_context(&self.shaders, &self.layouts, &self.targets, &self.context);
        let handle = self.pipelines.resolve(device, &ctx, index, pass)?;
        let polygon_offset = self.pipelines.definition(index).is_some_and(|d| d.polygon_offset);

        let frame = self.frame.as_mut().ok_or_else(no_frame)?;
        if frame.pipeline == handle {
            return Ok(());
        }
        device.record(cmd, &Command::BindPipeline(handle))?;
        if polygon_offset {
            device.record(
                cmd,
                &Command::SetDepthBias { constant: POLYGON_OFFSET_UNITS, slope: POLYGON_OFFSET_FACTOR },
            )?;
        }
        frame.pipeline = handle;
        self.stats.pipelines_compiled = self.pipelines.compiled_count();
        Ok(())
    }

    pub fn bind_texture(&mut self, slot: DescriptorSlot, texture: TextureId) -> Result<()> {
        let set = self.textures.descriptor(texture)?;
        self.descriptors.set(slot, set);
        Ok(())
    }

    /// Viewport and scissor of the following draws, in pass pixels
    pub fn set_viewport(&mut self, rect: Rect2D) -> Result<()> {
        let frame = self.frame.as_mut().ok_or_else(no_frame)?;
        frame.viewport = rect;
        frame.depth_range = None;
        frame.scissor_dirty = true;
        Ok(())
    }

    /// Draw the bound streams. `Ok(false)` when the draw was skipped
    /// because the geometry buffer overflowed this frame.
    pub fn draw_geometry(&mut self, device: &mut dyn GpuDevice, depth_range: DepthRange, indexed: bool) -> Result<bool> {
        let (cmd, _) = self.recording()?;
        let frame = self.frame.as_mut().ok_or_else(no_frame)?;
        if self.geometry.is_overflowed() {
            frame.skipped_draws += 1;
            return Ok(false);
        }
        if frame.pipeline.is_null() {
            return Err(Error::InvalidResource("draw without a bound pipeline".to_string()));
        }
        if frame.streams[VertexStream::Position.binding() as usize].is_none() {
            return Err(Error::InvalidResource("draw without vertex streams".to_string()));
        }

        if frame.depth_range != Some(depth_range) {
            device.record(cmd, &Command::SetViewport(depth_range.viewport(frame.viewport)))?;
            frame.depth_range = Some(depth_range);
        }
        if frame.scissor_dirty {
            device.record(cmd, &Command::SetScissor(frame.viewport))?;
            frame.scissor_dirty = false;
        }
        self.descriptors.flush(device, cmd, self.layouts.main)?;

        let command = match (indexed, frame.index_count) {
            (true, Some(index_count)) => Command::DrawIndexed { index_count, first_index: 0, vertex_offset: 0 },
            (true, None) => return Err(Error::InvalidResource("indexed draw without indices".to_string())),
            (false, _) => Command::Draw { vertex_count: frame.vertex_count, first_vertex: 0 },
        };
        device.record(cmd, &command)?;
        frame.draw_calls += 1;
        Ok(true)
    }

    /// Draw `draw` once per material stage, binding each stage's textures
    /// at `time`. Returns the number of draws recorded.
    pub fn draw_material(
        &mut self,
        device: &mut dyn GpuDevice,
        material: &Material,
        variant: MaterialVariant,
        draw: &MaterialDraw<'_>,
        depth_range: DepthRange,
        time: f64,
    ) -> Result<u32> {
        self.recording()?;
        if !self.bind_index(device, draw.indices)? {
            if let Some(frame) = self.frame.as_mut() {
                frame.skipped_draws += material.stages.len() as u32;
            }
            return Ok(0);
        }

        let mut stage_index = 0;
        let mut recorded = 0;
        material.iterator().run(material, variant, depth_range, |stage, pipeline, range| {
            let streams = draw.stages.get(stage_index).copied().unwrap_or_default();
            stage_index += 1;
            self.bind_stage_textures(stage, time)?;
            self.bind_pipeline(device, pipeline)?;

            let data = VertexData { positions: Some(draw.positions), normals: draw.normals, ..streams };
            if !self.bind_geometry(device, &data)? {
                if let Some(frame) = self.frame.as_mut() {
                    frame.skipped_draws += 1;
                }
                return Ok(());
            }
            if self.draw_geometry(device, range, true)? {
                recorded += 1;
            }
            Ok(())
        })?;
        engine_trace!("arena::draw", "'{}': {} stage draws", material.name, recorded);
        Ok(recorded)
    }

    fn bind_stage_textures(&mut self, stage: &MaterialStage, time: f64) -> Result<()> {
        for bundle in 0..MaterialStage::MAX_BUNDLES {
            let slot = DescriptorSlot::texture(bundle);
            match stage.bundles.get(bundle).and_then(|b| b.frame_at(time)) {
                Some(texture) => self.bind_texture(slot, texture)?,
                None => self.descriptors.clear(slot),
            }
        }
        Ok(())
    }

    /// Clear the color attachment inside the current viewport
    pub fn clear_color(&mut self, device: &mut dyn GpuDevice, color: [f32; 4]) -> Result<()> {
        let (cmd, _) = self.recording()?;
        let rect = self.frame.as_ref().map(|f| f.viewport).unwrap_or_default();
        device.record(cmd, &Command::ClearAttachments { color: Some(color), depth_stencil: None, rect })
    }

    pub fn clear_depth(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        let (cmd, pass) = self.recording()?;
        if pass == PipelinePass::PostBloom {
            return Err(Error::InvalidResource("the post-bloom pass has no depth attachment".to_string()));
        }
        let rect = self.frame.as_ref().map(|f| f.viewport).unwrap_or_default();
        device.record(cmd, &Command::ClearAttachments { color: None, depth_stencil: Some((1.0, 0)), rect })
    }
}

#[cfg(test)]
#[path = "draw_tests.rs"]
mod tests;
