//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. Objects it creates are
//! placeholders (buffers keep a CPU shadow copy) and [`CommandList`] records
//! every command so frame graph walks can be inspected in tests.

use crate::pipeline::{Pipeline, PipelineDescriptor};
use crate::resources::{BufferCreation, BufferHandle, ImageCreation, SamplerCreation};

use super::command::*;
use super::types::*;
use super::{BackendResult, GpuBuffer, GpuDescriptorSetLayout, GpuImage, GpuPipeline, GpuSampler};

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend;

impl DummyBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn create_image(&self, creation: &ImageCreation) -> BackendResult<GpuImage> {
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{}x{}, {} layers, {} mips)",
            creation.name,
            creation.width,
            creation.height,
            creation.depth,
            creation.layers,
            creation.mip_count()
        );
        Ok(GpuImage::Dummy {
            layers: creation.layers,
            mips: creation.mip_count(),
        })
    }

    pub fn create_buffer(&self, creation: &BufferCreation) -> BackendResult<GpuBuffer> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            creation.name,
            creation.size
        );
        Ok(GpuBuffer::Dummy {
            shadow: vec![0; creation.size as usize],
        })
    }

    pub fn create_sampler(&self, creation: &SamplerCreation) -> BackendResult<GpuSampler> {
        log::trace!("DummyBackend: creating sampler {:?}", creation.name);
        Ok(GpuSampler::Dummy)
    }

    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        push_descriptor: bool,
    ) -> BackendResult<GpuDescriptorSetLayout> {
        log::trace!(
            "DummyBackend: creating descriptor set layout ({} bindings, push: {})",
            bindings.len(),
            push_descriptor
        );
        Ok(GpuDescriptorSetLayout::Dummy)
    }

    pub fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_>) -> BackendResult<GpuPipeline> {
        log::trace!(
            "DummyBackend: creating {:?} pipeline {:?}",
            descriptor.bind_point,
            descriptor.name
        );
        Ok(GpuPipeline::Dummy)
    }
}

/// A command captured by [`CommandList`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginLabel {
        name: String,
        color: LabelColor,
    },
    EndLabel,
    PipelineBarrier(DependencyInfo),
    SetViewport(Viewport),
    SetScissor(Rect2D),
    FillBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    },
    BindPipeline {
        pipeline: String,
        bind_point: PipelineBindPoint,
    },
    PushDescriptors {
        pipeline: String,
        set: u32,
        writes: Vec<DescriptorWrite>,
    },
    PushConstants {
        pipeline: String,
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    BeginRendering(RenderingInfo),
    EndRendering,
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    },
    DrawIndexedIndirectCount {
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    },
}

/// Command recorder that stores commands instead of executing them.
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<RecordedCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Names of all debug labels, in recording order.
    pub fn labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginLabel { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Commands recorded between the label `name` and its matching end.
    pub fn commands_in_label(&self, name: &str) -> &[RecordedCommand] {
        let start = self.commands.iter().position(
            |command| matches!(command, RecordedCommand::BeginLabel { name: label, .. } if label == name),
        );
        let Some(start) = start else {
            return &[];
        };

        let mut depth = 0usize;
        for (offset, command) in self.commands[start + 1..].iter().enumerate() {
            match command {
                RecordedCommand::BeginLabel { .. } => depth += 1,
                RecordedCommand::EndLabel if depth == 0 => {
                    return &self.commands[start + 1..start + 1 + offset];
                }
                RecordedCommand::EndLabel => depth -= 1,
                _ => {}
            }
        }
        &self.commands[start + 1..]
    }

    fn push(&mut self, command: RecordedCommand) {
        log::trace!("CommandList: {:?}", command);
        self.commands.push(command);
    }
}

impl CommandRecorder for CommandList {
    fn begin_label(&mut self, name: &str, color: LabelColor) {
        self.push(RecordedCommand::BeginLabel {
            name: name.to_string(),
            color,
        });
    }

    fn end_label(&mut self) {
        self.push(RecordedCommand::EndLabel);
    }

    fn pipeline_barrier(&mut self, dependency: &DependencyInfo) {
        if !dependency.is_empty() {
            self.push(RecordedCommand::PipelineBarrier(dependency.clone()));
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.push(RecordedCommand::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        self.push(RecordedCommand::SetScissor(scissor));
    }

    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32) {
        self.push(RecordedCommand::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
    }

    fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        self.push(RecordedCommand::BindPipeline {
            pipeline: pipeline.name().to_string(),
            bind_point: pipeline.bind_point(),
        });
    }

    fn push_descriptors(&mut self, pipeline: &Pipeline, set: u32, writes: &[DescriptorWrite]) {
        self.push(RecordedCommand::PushDescriptors {
            pipeline: pipeline.name().to_string(),
            set,
            writes: writes.to_vec(),
        });
    }

    fn push_constants(&mut self, pipeline: &Pipeline, stages: ShaderStages, offset: u32, data: &[u8]) {
        self.push(RecordedCommand::PushConstants {
            pipeline: pipeline.name().to_string(),
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        if group_count_x == 0 || group_count_y == 0 || group_count_z == 0 {
            log::warn!(
                "CommandList: zero-sized dispatch ({}, {}, {})",
                group_count_x,
                group_count_y,
                group_count_z
            );
        }
        self.push(RecordedCommand::Dispatch {
            x: group_count_x,
            y: group_count_y,
            z: group_count_z,
        });
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) {
        self.push(RecordedCommand::BeginRendering(info.clone()));
    }

    fn end_rendering(&mut self) {
        self.push(RecordedCommand::EndRendering);
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        self.push(RecordedCommand::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });
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
        self.push(RecordedCommand::DrawIndexedIndirectCount {
            buffer,
            offset,
            count_buffer,
            count_offset,
            max_draw_count,
            stride,
        });
    }
}
