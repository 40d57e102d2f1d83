//! Compute pass compacting the scene's draw commands into a camera's draw batches

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};

use crate::backend::{
    AccessFlags, BufferBarrier, CommandRecorder, DependencyInfo, DescriptorBinding, DescriptorType,
    DescriptorWrite, ImageLayout, PipelineStages, ShaderStages,
};
use crate::context::GraphicsContext;
use crate::error::RendererResult;
use crate::frame_graph::FrameGraphRenderPass;
use crate::gpu_scene::DrawRange;
use crate::pipeline::{ComputePipelineBuilder, Pipeline};
use crate::scene::RenderSceneDescription;

use super::camera_batch::{CameraBatch, DrawBatch};
use super::hzb::group_count;

/// Work group size of the culling shader.
pub const GENERATE_DRAWS_LOCAL_SIZE: u32 = 64;

/// Push constants of the culling shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GenerateDrawsConstants {
    /// 1 while culling against last frame's HZB
    pub is_prepass: u32,
    /// Edge of HZB mip 0 in texels
    pub mip_size: f32,
    pub draw_commands_count: u32,
    /// First scene draw of the culled class
    pub draw_offset: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<GenerateDrawsConstants>(), 16);

/// Culls one camera's draws on the GPU.
///
/// The pass is scheduled twice per frame. The first recording culls against
/// the HZB left by the previous frame; the second tests the draws the first
/// one rejected against the HZB rebuilt in between. Which of the two is
/// recorded next flips after every recording.
pub struct GenerateDrawsPass<'a> {
    camera_batch: &'a CameraBatch,
    pipeline: Pipeline,
    is_prepass: Cell<bool>,
}

impl<'a> GenerateDrawsPass<'a> {
    pub fn new(
        context: &mut GraphicsContext,
        camera_batch: &'a CameraBatch,
        spirv: Vec<u32>,
    ) -> RendererResult<Self> {
        let pipeline = ComputePipelineBuilder::new(format!("{} Generate Draws", camera_batch.name()))
            .with_shader(spirv)
            .with_bindings(&Self::bindings())
            .with_push_constants(std::mem::size_of::<GenerateDrawsConstants>() as u32)
            .build(context)?;

        Ok(Self {
            camera_batch,
            pipeline,
            is_prepass: Cell::new(true),
        })
    }

    fn bindings() -> [DescriptorBinding; 7] {
        let storage = |binding| DescriptorBinding::new(binding, DescriptorType::StorageBuffer, ShaderStages::COMPUTE);
        [
            storage(0),
            storage(1),
            storage(2),
            DescriptorBinding::new(3, DescriptorType::UniformBuffer, ShaderStages::COMPUTE),
            storage(4),
            storage(5),
            DescriptorBinding::new(6, DescriptorType::CombinedImageSampler, ShaderStages::COMPUTE),
        ]
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Whether the next recording is the prepass.
    pub fn is_prepass(&self) -> bool {
        self.is_prepass.get()
    }

    fn record_batch(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
        batch: &DrawBatch,
        range: DrawRange,
    ) {
        let is_prepass = self.is_prepass.get();

        cmd.fill_buffer(batch.redirect_buffer, 0, 4, 0);
        cmd.pipeline_barrier(&DependencyInfo::buffer(BufferBarrier::new(
            batch.redirect_buffer,
            PipelineStages::TRANSFER,
            AccessFlags::TRANSFER_WRITE,
            PipelineStages::COMPUTE_SHADER,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
        )));

        if range.is_empty() {
            log::trace!(
                "{}: no draws at offset {}, skipping dispatch",
                self.pipeline.name(),
                range.offset
            );
        } else {
            let writes = [
                DescriptorWrite::StorageBuffer {
                    binding: 0,
                    buffer: scene.gpu_scene.draw_buffer(current_frame),
                },
                DescriptorWrite::StorageBuffer {
                    binding: 1,
                    buffer: batch.draw_buffer,
                },
                DescriptorWrite::StorageBuffer {
                    binding: 2,
                    buffer: scene.gpu_scene.instance_buffer(current_frame),
                },
                DescriptorWrite::UniformBuffer {
                    binding: 3,
                    buffer: self.camera_batch.camera_buffer(current_frame),
                },
                DescriptorWrite::StorageBuffer {
                    binding: 4,
                    buffer: batch.visibility_buffer,
                },
                DescriptorWrite::StorageBuffer {
                    binding: 5,
                    buffer: batch.redirect_buffer,
                },
                DescriptorWrite::CombinedImageSampler {
                    binding: 6,
                    image: self.camera_batch.hzb_image(),
                    mip: None,
                    sampler: self.camera_batch.hzb_sampler(),
                    layout: ImageLayout::General,
                },
            ];
            cmd.push_descriptors(&self.pipeline, 0, &writes);

            let constants = GenerateDrawsConstants {
                is_prepass: is_prepass as u32,
                mip_size: self.camera_batch.hzb_size() as f32,
                draw_commands_count: range.count,
                draw_offset: range.offset,
            };
            cmd.push_constants(
                &self.pipeline,
                ShaderStages::COMPUTE,
                0,
                bytemuck::bytes_of(&constants),
            );
            cmd.dispatch(group_count(range.count, GENERATE_DRAWS_LOCAL_SIZE), 1, 1);
        }

        let visibility_access = if is_prepass {
            AccessFlags::SHADER_READ
        } else {
            AccessFlags::SHADER_WRITE
        };
        let indirect = |buffer| {
            BufferBarrier::new(
                buffer,
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_WRITE,
                PipelineStages::DRAW_INDIRECT,
                AccessFlags::INDIRECT_COMMAND_READ,
            )
        };
        cmd.pipeline_barrier(&DependencyInfo {
            image_barriers: Vec::new(),
            buffer_barriers: vec![
                BufferBarrier::new(
                    batch.visibility_buffer,
                    PipelineStages::COMPUTE_SHADER,
                    visibility_access,
                    PipelineStages::DRAW_INDIRECT,
                    AccessFlags::MEMORY_READ,
                ),
                indirect(batch.draw_buffer),
                indirect(batch.redirect_buffer),
            ],
        });
    }
}

impl FrameGraphRenderPass for GenerateDrawsPass<'_> {
    fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
    ) {
        cmd.bind_pipeline(&self.pipeline);

        let ranges = [scene.gpu_scene.static_draws(), scene.gpu_scene.skinned_draws()];
        for (batch, range) in self.camera_batch.draw_batches().into_iter().zip(ranges) {
            self.record_batch(cmd, current_frame, scene, batch, range);
        }

        self.is_prepass.set(!self.is_prepass.get());
    }
}
