//! Translation of recorded `Command`s into Vulkan command buffer calls

use arena_render::arena::Result;
use arena_render::device::*;
use ash::vk;

use crate::convert::*;
use crate::device::{to_vk, VulkanDevice};

fn subresource_layers(aspect: ImageAspect, mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_to_vk(aspect),
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn buffer_image_copy(region: &BufferImageCopy, aspect: ImageAspect) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: subresource_layers(aspect, region.mip_level),
        image_offset: vk::Offset3D { x: region.x, y: region.y, z: 0 },
        image_extent: vk::Extent3D { width: region.width, height: region.height, depth: 1 },
    }
}

/// Corner offsets of a blit region
fn blit_offsets(rect: Rect2D) -> [vk::Offset3D; 2] {
    [
        vk::Offset3D { x: rect.x, y: rect.y, z: 0 },
        vk::Offset3D { x: rect.x + rect.width as i32, y: rect.y + rect.height as i32, z: 1 },
    ]
}

impl VulkanDevice {
    pub(crate) fn record_command(&self, cmd: vk::CommandBuffer, command: &Command) -> Result<()> {
        let device = &self.device;
        unsafe {
            match command {
                Command::BeginRenderPass { render_pass, framebuffer, area, clear_values } => {
                    let clears: Vec<vk::ClearValue> = clear_values.iter().map(clear_value_to_vk).collect();
                    let info = vk::RenderPassBeginInfo::default()
                        .render_pass(to_vk(render_pass.0))
                        .framebuffer(to_vk(framebuffer.0))
                        .render_area(rect_to_vk(*area))
                        .clear_values(&clears);
                    device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => device.cmd_end_render_pass(cmd),
                Command::BindPipeline(pipeline) => {
                    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, to_vk(pipeline.0));
                }
                Command::BindVertexBuffers { first_binding, buffers } => {
                    let mut handles = Vec::with_capacity(buffers.len());
                    let mut offsets = Vec::with_capacity(buffers.len());
                    for &(buffer, offset) in buffers {
                        handles.push(self.host_buffer(buffer)?.buffer);
                        offsets.push(offset);
                    }
                    device.cmd_bind_vertex_buffers(cmd, *first_binding, &handles, &offsets);
                }
                Command::BindIndexBuffer { buffer, offset, index_type } => {
                    let index_type = match index_type {
                        IndexType::U16 => vk::IndexType::UINT16,
                        IndexType::U32 => vk::IndexType::UINT32,
                    };
                    device.cmd_bind_index_buffer(cmd, self.host_buffer(*buffer)?.buffer, *offset, index_type);
                }
                Command::BindDescriptorSets { layout, first_set, sets, dynamic_offsets } => {
                    let sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| to_vk(s.0)).collect();
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        to_vk(layout.0),
                        *first_set,
                        &sets,
                        dynamic_offsets,
                    );
                }
                Command::SetViewport(viewport) => {
                    let viewports = [vk::Viewport {
                        x: viewport.x,
                        y: viewport.y,
                        width: viewport.width,
                        height: viewport.height,
                        min_depth: viewport.min_depth,
                        max_depth: viewport.max_depth,
                    }];
                    device.cmd_set_viewport(cmd, 0, &viewports);
                }
                Command::SetScissor(rect) => device.cmd_set_scissor(cmd, 0, &[rect_to_vk(*rect)]),
                Command::SetDepthBias { constant, slope } => {
                    device.cmd_set_depth_bias(cmd, *constant, 0.0, *slope);
                }
                Command::PushConstants { layout, stages, offset, data } => {
                    device.cmd_push_constants(cmd, to_vk(layout.0), shader_stages_to_vk(*stages), *offset, data);
                }
                Command::Draw { vertex_count, first_vertex } => {
                    device.cmd_draw(cmd, *vertex_count, 1, *first_vertex, 0);
                }
                Command::DrawIndexed { index_count, first_index, vertex_offset } => {
                    device.cmd_draw_indexed(cmd, *index_count, 1, *first_index, *vertex_offset, 0);
                }
                Command::ClearAttachments { color, depth_stencil, rect } => {
                    let mut attachments = Vec::with_capacity(2);
                    if let Some(color) = color {
                        attachments.push(vk::ClearAttachment {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            color_attachment: 0,
                            clear_value: vk::ClearValue { color: vk::ClearColorValue { float32: *color } },
                        });
                    }
                    if let Some((depth, stencil)) = depth_stencil {
                        let aspect_mask = if self.pass_has_stencil {
                            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
                        } else {
                            vk::ImageAspectFlags::DEPTH
                        };
                        attachments.push(vk::ClearAttachment {
                            aspect_mask,
                            color_attachment: 0,
                            clear_value: vk::ClearValue {
                                depth_stencil: vk::ClearDepthStencilValue { depth: *depth, stencil: *stencil },
                            },
                        });
                    }
                    if !attachments.is_empty() {
                        let rects = [vk::ClearRect { rect: rect_to_vk(*rect), base_array_layer: 0, layer_count: 1 }];
                        device.cmd_clear_attachments(cmd, &attachments, &rects);
                    }
                }
                Command::PipelineBarrier(barrier) => {
                    let image_barrier = vk::ImageMemoryBarrier::default()
                        .src_access_mask(access_to_vk(barrier.src_access))
                        .dst_access_mask(access_to_vk(barrier.dst_access))
                        .old_layout(image_layout_to_vk(barrier.old_layout))
                        .new_layout(image_layout_to_vk(barrier.new_layout))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(to_vk(barrier.image.0))
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: aspect_to_vk(barrier.aspect),
                            base_mip_level: barrier.base_mip,
                            level_count: barrier.mip_count,
                            base_array_layer: 0,
                            layer_count: 1,
                        });
                    device.cmd_pipeline_barrier(
                        cmd,
                        pipeline_stages_to_vk(barrier.src_stages),
                        pipeline_stages_to_vk(barrier.dst_stages),
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[image_barrier],
                    );
                }
                Command::CopyBufferToImage { buffer, image, regions } => {
                    let regions: Vec<vk::BufferImageCopy> =
                        regions.iter().map(|r| buffer_image_copy(r, ImageAspect::Color)).collect();
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        self.host_buffer(*buffer)?.buffer,
                        to_vk(image.0),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                    );
                }
                Command::CopyImageToBuffer { image, layout, buffer, region } => {
                    device.cmd_copy_image_to_buffer(
                        cmd,
                        to_vk(image.0),
                        image_layout_to_vk(*layout),
                        self.host_buffer(*buffer)?.buffer,
                        &[buffer_image_copy(region, ImageAspect::Color)],
                    );
                }
                Command::BlitImage { src, src_layout, src_rect, dst, dst_layout, dst_rect, linear } => {
                    let region = vk::ImageBlit {
                        src_subresource: subresource_layers(ImageAspect::Color, 0),
                        src_offsets: blit_offsets(*src_rect),
                        dst_subresource: subresource_layers(ImageAspect::Color, 0),
                        dst_offsets: blit_offsets(*dst_rect),
                    };
                    let filter = if *linear { vk::Filter::LINEAR } else { vk::Filter::NEAREST };
                    device.cmd_blit_image(
                        cmd,
                        to_vk(src.0),
                        image_layout_to_vk(*src_layout),
                        to_vk(dst.0),
                        image_layout_to_vk(*dst_layout),
                        &[region],
                        filter,
                    );
                }
            }
        }
        Ok(())
    }
}
