//! Command recording into a Vulkan command buffer.

use std::ffi::CString;

use ash::vk;

use crate::backend::command::*;
use crate::backend::types::*;
use crate::backend::{GpuBuffer, GpuImage, GpuImageView, GpuPipeline, GpuSampler};
use crate::pipeline::Pipeline;
use crate::resources::{BufferHandle, GpuResources, ImageHandle, SamplerHandle};

use super::conversion::*;

/// [`CommandRecorder`] writing into a `vk::CommandBuffer`.
///
/// Handles are resolved through the resource managers at record time. A
/// handle that no longer resolves to a Vulkan object is logged and the
/// command is skipped.
pub struct VulkanCommandRecorder<'a> {
    device: &'a ash::Device,
    push_descriptor: &'a ash::khr::push_descriptor::Device,
    debug_utils: Option<&'a ash::ext::debug_utils::Device>,
    resources: &'a GpuResources,
    cmd: vk::CommandBuffer,
}

impl<'a> VulkanCommandRecorder<'a> {
    pub(super) fn new(
        device: &'a ash::Device,
        push_descriptor: &'a ash::khr::push_descriptor::Device,
        debug_utils: Option<&'a ash::ext::debug_utils::Device>,
        resources: &'a GpuResources,
        cmd: vk::CommandBuffer,
    ) -> Self {
        Self {
            device,
            push_descriptor,
            debug_utils,
            resources,
            cmd,
        }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn image(&self, handle: ImageHandle) -> Option<vk::Image> {
        match self.resources.images.get(handle).map(|image| image.gpu()) {
            Some(GpuImage::Vulkan { image, .. }) => Some(*image),
            _ => {
                log::error!("Skipping command on unresolved image {:?}", handle);
                None
            }
        }
    }

    fn image_view(&self, handle: ImageHandle, mip: Option<u32>) -> Option<vk::ImageView> {
        let image = self.resources.images.get(handle)?;
        let view = match mip {
            Some(mip) => image.mip_view(0, mip),
            None => Some(image.view),
        };
        match view {
            Some(GpuImageView::Vulkan(view)) => Some(view),
            _ => {
                log::error!("Skipping command on unresolved view of {:?} (mip {:?})", handle, mip);
                None
            }
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        match self.resources.buffers.get(handle).map(|buffer| buffer.gpu()) {
            Some(GpuBuffer::Vulkan { buffer, .. }) => Some(*buffer),
            _ => {
                log::error!("Skipping command on unresolved buffer {:?}", handle);
                None
            }
        }
    }

    fn sampler(&self, handle: SamplerHandle) -> Option<vk::Sampler> {
        match self.resources.samplers.get(handle).map(|sampler| sampler.gpu()) {
            Some(GpuSampler::Vulkan { sampler, .. }) => Some(*sampler),
            _ => {
                log::error!("Skipping command on unresolved sampler {:?}", handle);
                None
            }
        }
    }

    fn pipeline(pipeline: &Pipeline) -> Option<(vk::Pipeline, vk::PipelineLayout)> {
        match pipeline.gpu() {
            GpuPipeline::Vulkan {
                pipeline, layout, ..
            } => Some((*pipeline, *layout)),
            GpuPipeline::Dummy => {
                log::error!("Pipeline {:?} was not created by the Vulkan backend", pipeline.name());
                None
            }
        }
    }

    fn rendering_attachment(
        &self,
        attachment: &RenderingAttachment,
    ) -> Option<vk::RenderingAttachmentInfo<'static>> {
        let view = self.image_view(attachment.image, None)?;
        let load_op = match attachment.load_op {
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        };
        let clear_value = match attachment.clear_value {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        };

        Some(
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(convert_image_layout(attachment.layout))
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value),
        )
    }
}

impl CommandRecorder for VulkanCommandRecorder<'_> {
    fn begin_label(&mut self, name: &str, color: LabelColor) {
        let Some(debug_utils) = self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color([color.x, color.y, color.z, 1.0]);
        unsafe { debug_utils.cmd_begin_debug_utils_label(self.cmd, &label) };
    }

    fn end_label(&mut self) {
        if let Some(debug_utils) = self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.cmd) };
        }
    }

    fn pipeline_barrier(&mut self, dependency: &DependencyInfo) {
        if dependency.is_empty() {
            return;
        }

        let image_barriers: Vec<vk::ImageMemoryBarrier2> = dependency
            .image_barriers
            .iter()
            .filter_map(|barrier| {
                let image = self.image(barrier.image)?;
                Some(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(convert_pipeline_stages(barrier.src_stages))
                        .src_access_mask(convert_access_flags(barrier.src_access))
                        .dst_stage_mask(convert_pipeline_stages(barrier.dst_stages))
                        .dst_access_mask(convert_access_flags(barrier.dst_access))
                        .old_layout(convert_image_layout(barrier.old_layout))
                        .new_layout(convert_image_layout(barrier.new_layout))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: convert_image_aspect(barrier.aspect),
                            base_mip_level: barrier.base_mip,
                            level_count: barrier.mip_count,
                            base_array_layer: barrier.base_layer,
                            layer_count: barrier.layer_count,
                        }),
                )
            })
            .collect();

        let buffer_barriers: Vec<vk::BufferMemoryBarrier2> = dependency
            .buffer_barriers
            .iter()
            .filter_map(|barrier| {
                let buffer = self.buffer(barrier.buffer)?;
                let size = if barrier.size == WHOLE_SIZE {
                    vk::WHOLE_SIZE
                } else {
                    barrier.size
                };
                Some(
                    vk::BufferMemoryBarrier2::default()
                        .src_stage_mask(convert_pipeline_stages(barrier.src_stages))
                        .src_access_mask(convert_access_flags(barrier.src_access))
                        .dst_stage_mask(convert_pipeline_stages(barrier.dst_stages))
                        .dst_access_mask(convert_access_flags(barrier.dst_access))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(barrier.offset)
                        .size(size),
                )
            })
            .collect();

        let info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &info) };
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(self.cmd, 0, &[convert_viewport(viewport)])
        };
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, &[convert_rect(scissor)]) };
    }

    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32) {
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        let size = if size == WHOLE_SIZE { vk::WHOLE_SIZE } else { size };
        unsafe {
            self.device
                .cmd_fill_buffer(self.cmd, buffer, offset, size, value)
        };
    }

    fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        let Some((vk_pipeline, _)) = Self::pipeline(pipeline) else {
            return;
        };
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                convert_bind_point(pipeline.bind_point()),
                vk_pipeline,
            )
        };
    }

    fn push_descriptors(&mut self, pipeline: &Pipeline, set: u32, writes: &[DescriptorWrite]) {
        let Some((_, layout)) = Self::pipeline(pipeline) else {
            return;
        };

        // Resolve everything first so the info arrays are not reallocated
        // while descriptor writes point into them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut resolved = Vec::with_capacity(writes.len());
        for write in writes {
            match *write {
                DescriptorWrite::UniformBuffer { binding, buffer }
                | DescriptorWrite::StorageBuffer { binding, buffer } => {
                    let Some(buffer) = self.buffer(buffer) else {
                        return;
                    };
                    let ty = if matches!(write, DescriptorWrite::UniformBuffer { .. }) {
                        vk::DescriptorType::UNIFORM_BUFFER
                    } else {
                        vk::DescriptorType::STORAGE_BUFFER
                    };
                    resolved.push((binding, ty, true, buffer_infos.len()));
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    });
                }
                DescriptorWrite::CombinedImageSampler {
                    binding,
                    image,
                    mip,
                    sampler,
                    layout,
                } => {
                    let (Some(view), Some(sampler)) =
                        (self.image_view(image, mip), self.sampler(sampler))
                    else {
                        return;
                    };
                    resolved.push((
                        binding,
                        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        false,
                        image_infos.len(),
                    ));
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: convert_image_layout(layout),
                    });
                }
                DescriptorWrite::StorageImage {
                    binding,
                    image,
                    mip,
                    layout,
                } => {
                    let Some(view) = self.image_view(image, mip) else {
                        return;
                    };
                    resolved.push((
                        binding,
                        vk::DescriptorType::STORAGE_IMAGE,
                        false,
                        image_infos.len(),
                    ));
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: convert_image_layout(layout),
                    });
                }
            }
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = resolved
            .iter()
            .map(|&(binding, ty, is_buffer, index)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_binding(binding)
                    .descriptor_type(ty);
                if is_buffer {
                    write.buffer_info(std::slice::from_ref(&buffer_infos[index]))
                } else {
                    write.image_info(std::slice::from_ref(&image_infos[index]))
                }
            })
            .collect();

        unsafe {
            self.push_descriptor.cmd_push_descriptor_set(
                self.cmd,
                convert_bind_point(pipeline.bind_point()),
                layout,
                set,
                &vk_writes,
            )
        };
    }

    fn push_constants(&mut self, pipeline: &Pipeline, stages: ShaderStages, offset: u32, data: &[u8]) {
        let Some((_, layout)) = Self::pipeline(pipeline) else {
            return;
        };
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                layout,
                convert_shader_stages(stages),
                offset,
                data,
            )
        };
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device
                .cmd_dispatch(self.cmd, group_count_x, group_count_y, group_count_z)
        };
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = info
            .color_attachments
            .iter()
            .filter_map(|attachment| self.rendering_attachment(attachment))
            .collect();
        let depth_attachment = info
            .depth_attachment
            .as_ref()
            .and_then(|attachment| self.rendering_attachment(attachment));

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(convert_rect(info.area))
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.device.cmd_begin_rendering(self.cmd, &rendering_info) };
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.cmd_end_rendering(self.cmd) };
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.cmd,
                buffer,
                offset,
                convert_index_type(index_type),
            )
        };
    }

    fn draw_indexed_indirect_count(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    ) {
        let (Some(buffer), Some(count_buffer)) = (self.buffer(buffer), self.buffer(count_buffer))
        else {
            return;
        };
        unsafe {
            self.device.cmd_draw_indexed_indirect_count(
                self.cmd,
                buffer,
                offset,
                count_buffer,
                count_offset,
                max_draw_count,
                stride,
            )
        };
    }
}
