//! Compute pass downsampling a depth buffer into its hierarchical Z-buffer

use crate::backend::{
    AddressMode, CommandRecorder, DependencyInfo, DescriptorBinding, DescriptorType,
    DescriptorWrite, Filter, ImageAspect, ImageBarrier, ImageLayout, MipmapMode, PipelineStages,
    ShaderStages,
};
use crate::context::GraphicsContext;
use crate::error::RendererResult;
use crate::frame_graph::FrameGraphRenderPass;
use crate::pipeline::{ComputePipelineBuilder, Pipeline};
use crate::resources::{GpuResources, SamplerCreation, SamplerHandle};
use crate::scene::RenderSceneDescription;

use super::camera_batch::CameraBatch;
use super::hzb::{group_count, hzb_mip_count, hzb_reduction, HZB_LOCAL_SIZE};

/// Builds a camera's HZB from the depth its geometry pass rendered.
///
/// Mip 0 reduces the depth buffer, every further mip reduces the one above
/// it. Between mips the written level moves to shader-read layout so the
/// next dispatch can sample it. When the pass ends the whole HZB is left in
/// `General` for the culling shader.
pub struct BuildHzbPass<'a> {
    camera_batch: &'a CameraBatch,
    pipeline: Pipeline,
    sampler: SamplerHandle,
}

impl<'a> BuildHzbPass<'a> {
    pub fn new(
        context: &mut GraphicsContext,
        camera_batch: &'a CameraBatch,
        spirv: Vec<u32>,
    ) -> RendererResult<Self> {
        let sampler = context.create_sampler(
            &SamplerCreation::new()
                .with_filters(Filter::Linear, Filter::Linear)
                .with_mipmap_mode(MipmapMode::Nearest)
                .with_global_address_mode(AddressMode::ClampToEdge)
                .with_anisotropy(false)
                .with_lod(0.0, 0.0)
                .with_reduction_mode(hzb_reduction(camera_batch.reverse_z()))
                .with_name("HZB Sampler"),
        )?;

        let pipeline = ComputePipelineBuilder::new(format!("{} Build HZB", camera_batch.name()))
            .with_shader(spirv)
            .with_bindings(&[
                DescriptorBinding::new(0, DescriptorType::CombinedImageSampler, ShaderStages::COMPUTE),
                DescriptorBinding::new(1, DescriptorType::StorageImage, ShaderStages::COMPUTE),
            ])
            .with_push_constants(std::mem::size_of::<u32>() as u32)
            .build(context)?;

        Ok(Self {
            camera_batch,
            pipeline,
            sampler,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }

    pub fn destroy(self, resources: &mut GpuResources) {
        resources.samplers.destroy(self.sampler);
    }

    fn transition(&self, old: ImageLayout, new: ImageLayout, base_mip: u32, mip_count: u32) -> DependencyInfo {
        DependencyInfo::image(
            ImageBarrier::transition(self.camera_batch.hzb_image(), ImageAspect::COLOR, old, new)
                .with_mips(base_mip, mip_count)
                .with_stages(PipelineStages::COMPUTE_SHADER, PipelineStages::COMPUTE_SHADER),
        )
    }
}

impl FrameGraphRenderPass for BuildHzbPass<'_> {
    fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        _current_frame: u32,
        _scene: &RenderSceneDescription<'_>,
    ) {
        let hzb = self.camera_batch.hzb_image();
        let size = self.camera_batch.hzb_size();
        let mips = hzb_mip_count(size);

        cmd.bind_pipeline(&self.pipeline);

        for mip in 0..mips {
            let mip_size = (size >> mip).max(1);

            cmd.pipeline_barrier(&self.transition(ImageLayout::Undefined, ImageLayout::General, mip, 1));

            let source = if mip == 0 {
                DescriptorWrite::CombinedImageSampler {
                    binding: 0,
                    image: self.camera_batch.depth_image(),
                    mip: None,
                    sampler: self.sampler,
                    layout: ImageLayout::ShaderReadOnlyOptimal,
                }
            } else {
                DescriptorWrite::CombinedImageSampler {
                    binding: 0,
                    image: hzb,
                    mip: Some(mip - 1),
                    sampler: self.sampler,
                    layout: ImageLayout::ShaderReadOnlyOptimal,
                }
            };
            let target = DescriptorWrite::StorageImage {
                binding: 1,
                image: hzb,
                mip: Some(mip),
                layout: ImageLayout::General,
            };
            cmd.push_descriptors(&self.pipeline, 0, &[source, target]);
            cmd.push_constants(&self.pipeline, ShaderStages::COMPUTE, 0, &mip_size.to_ne_bytes());

            let groups = group_count(mip_size, HZB_LOCAL_SIZE);
            cmd.dispatch(groups, groups, 1);

            cmd.pipeline_barrier(&self.transition(
                ImageLayout::General,
                ImageLayout::ShaderReadOnlyOptimal,
                mip,
                1,
            ));
        }

        cmd.pipeline_barrier(&self.transition(
            ImageLayout::ShaderReadOnlyOptimal,
            ImageLayout::General,
            0,
            mips,
        ));
    }
}
