//! Graphics pass drawing a camera's culled draw batches

use std::cell::Cell;

use crate::backend::{
    CommandRecorder, CompareOp, DependencyInfo, DescriptorBinding, DescriptorType,
    DescriptorWrite, Extent2D, Format, ImageAspect, ImageBarrier, ImageLayout, LoadOp, Rect2D,
    RenderingAttachment, RenderingInfo, ShaderStages,
};
use crate::context::GraphicsContext;
use crate::error::{RendererError, RendererResult};
use crate::frame_graph::FrameGraphRenderPass;
use crate::gpu_scene::DrawIndexedIndirectCommand;
use crate::pipeline::{GraphicsPipelineBuilder, Pipeline};
use crate::resources::{BatchBuffer, ImageHandle};
use crate::scene::RenderSceneDescription;

use super::camera_batch::{CameraBatch, DrawBatch};

/// Draws the output of [`GenerateDrawsPass`](super::GenerateDrawsPass) with
/// indirect count draws, one per geometry class.
///
/// Like the culling pass it runs twice per frame: the prepass clears the
/// targets, the second pass loads them and adds the draws found visible
/// after the HZB rebuild.
pub struct GeometryPass<'a> {
    camera_batch: &'a CameraBatch,
    static_geometry: &'a BatchBuffer,
    skinned_geometry: &'a BatchBuffer,
    color_targets: Vec<ImageHandle>,
    depth_extent: Extent2D,
    depth_aspect: ImageAspect,
    clear_depth: f32,
    pipeline: Pipeline,
    is_prepass: Cell<bool>,
}

impl<'a> GeometryPass<'a> {
    pub fn new(
        context: &mut GraphicsContext,
        camera_batch: &'a CameraBatch,
        static_geometry: &'a BatchBuffer,
        skinned_geometry: &'a BatchBuffer,
        color_targets: &[ImageHandle],
        vertex_spirv: Vec<u32>,
        fragment_spirv: Vec<u32>,
    ) -> RendererResult<Self> {
        let images = &context.resources().images;
        let depth = images
            .get(camera_batch.depth_image())
            .ok_or(RendererError::InvalidHandle { kind: "image" })?;
        let depth_format = depth.format;
        let depth_extent = depth.extent();
        let depth_aspect = depth.aspect();
        let color_formats = color_targets
            .iter()
            .map(|&handle| {
                images
                    .get(handle)
                    .map(|image| image.format)
                    .ok_or(RendererError::InvalidHandle { kind: "image" })
            })
            .collect::<RendererResult<Vec<Format>>>()?;

        let depth_compare = if camera_batch.reverse_z() {
            CompareOp::GreaterOrEqual
        } else {
            CompareOp::LessOrEqual
        };
        let clear_depth = context.config().clear_depth();

        let pipeline = GraphicsPipelineBuilder::new(format!("{} Geometry", camera_batch.name()))
            .with_vertex_shader(vertex_spirv)
            .with_fragment_shader(fragment_spirv)
            .with_bindings(&[
                DescriptorBinding::new(
                    0,
                    DescriptorType::UniformBuffer,
                    ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ),
                DescriptorBinding::new(1, DescriptorType::StorageBuffer, ShaderStages::VERTEX),
                DescriptorBinding::new(2, DescriptorType::StorageBuffer, ShaderStages::VERTEX),
                DescriptorBinding::new(3, DescriptorType::StorageBuffer, ShaderStages::VERTEX),
                DescriptorBinding::new(4, DescriptorType::StorageBuffer, ShaderStages::FRAGMENT),
            ])
            .with_color_formats(&color_formats)
            .with_depth(depth_format, depth_compare, true)
            .build(context)?;

        Ok(Self {
            camera_batch,
            static_geometry,
            skinned_geometry,
            color_targets: color_targets.to_vec(),
            depth_extent,
            depth_aspect,
            clear_depth,
            pipeline,
            is_prepass: Cell::new(true),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn color_targets(&self) -> &[ImageHandle] {
        &self.color_targets
    }

    /// Whether the next recording is the prepass.
    pub fn is_prepass(&self) -> bool {
        self.is_prepass.get()
    }

    fn draw_batch(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
        batch: &DrawBatch,
        geometry: &BatchBuffer,
    ) {
        cmd.push_descriptors(
            &self.pipeline,
            0,
            &[
                DescriptorWrite::UniformBuffer {
                    binding: 0,
                    buffer: self.camera_batch.camera_buffer(current_frame),
                },
                DescriptorWrite::StorageBuffer {
                    binding: 1,
                    buffer: scene.gpu_scene.instance_buffer(current_frame),
                },
                DescriptorWrite::StorageBuffer {
                    binding: 2,
                    buffer: batch.redirect_buffer,
                },
                DescriptorWrite::StorageBuffer {
                    binding: 3,
                    buffer: geometry.vertex_buffer(),
                },
                DescriptorWrite::StorageBuffer {
                    binding: 4,
                    buffer: scene.gpu_scene.material_buffer(current_frame),
                },
            ],
        );
        cmd.bind_index_buffer(geometry.index_buffer(), 0, geometry.index_type());
        cmd.draw_indexed_indirect_count(
            batch.draw_buffer,
            0,
            batch.redirect_buffer,
            0,
            batch.capacity,
            std::mem::size_of::<DrawIndexedIndirectCommand>() as u32,
        );
    }
}

impl FrameGraphRenderPass for GeometryPass<'_> {
    fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
    ) {
        let is_prepass = self.is_prepass.get();
        let depth_image = self.camera_batch.depth_image();

        // the HZB build left depth readable by shaders
        if !is_prepass {
            cmd.pipeline_barrier(&DependencyInfo::image(ImageBarrier::transition(
                depth_image,
                self.depth_aspect,
                ImageLayout::ShaderReadOnlyOptimal,
                ImageLayout::DepthStencilAttachmentOptimal,
            )));
        }

        let load_op = if is_prepass { LoadOp::Clear } else { LoadOp::Load };
        cmd.begin_rendering(&RenderingInfo {
            area: Rect2D::from_extent(self.depth_extent),
            color_attachments: self
                .color_targets
                .iter()
                .map(|&image| RenderingAttachment::color(image, load_op))
                .collect(),
            depth_attachment: Some(RenderingAttachment::depth(depth_image, load_op, self.clear_depth)),
        });
        cmd.bind_pipeline(&self.pipeline);

        let classes = [
            (self.camera_batch.static_draw(), self.static_geometry, scene.gpu_scene.static_draws()),
            (self.camera_batch.skinned_draw(), self.skinned_geometry, scene.gpu_scene.skinned_draws()),
        ];
        for (batch, geometry, range) in classes {
            if range.is_empty() {
                continue;
            }
            self.draw_batch(cmd, current_frame, scene, batch, geometry);
        }

        cmd.end_rendering();
        self.is_prepass.set(!is_prepass);
    }
}
