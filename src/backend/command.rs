//! Command recording surface shared by the frame graph and render passes.
//!
//! Passes never talk to a graphics API directly. They emit commands through
//! [`CommandRecorder`], which is implemented by the dummy
//! [`CommandList`](super::dummy::CommandList) for headless runs and tests and
//! by the Vulkan recorder for real command buffers. Commands reference GPU
//! objects by resource handle; the recorder resolves them.

use crate::pipeline::Pipeline;
use crate::resources::{BufferHandle, ImageHandle, SamplerHandle};

use super::types::*;

/// Sentinel size covering a buffer from `offset` to its end.
pub const WHOLE_SIZE: u64 = u64::MAX;

/// Layout transition of an image subresource range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
    pub aspect: ImageAspect,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageBarrier {
    /// Transition of the first mip of the first layer, with stage and access
    /// masks derived from the two layouts.
    pub fn transition(
        image: ImageHandle,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Self {
        let src = old_layout.source_state();
        let dst = new_layout.destination_state();
        Self {
            image,
            old_layout,
            new_layout,
            src_stages: src.stages,
            src_access: src.access,
            dst_stages: dst.stages,
            dst_access: dst.access,
            aspect,
            base_mip: 0,
            mip_count: 1,
            base_layer: 0,
            layer_count: 1,
        }
    }

    pub fn with_mips(mut self, base_mip: u32, mip_count: u32) -> Self {
        self.base_mip = base_mip;
        self.mip_count = mip_count;
        self
    }

    pub fn with_layers(mut self, base_layer: u32, layer_count: u32) -> Self {
        self.base_layer = base_layer;
        self.layer_count = layer_count;
        self
    }

    pub fn with_stages(mut self, src: PipelineStages, dst: PipelineStages) -> Self {
        self.src_stages = src;
        self.dst_stages = dst;
        self
    }
}

/// Memory dependency on a buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
    pub offset: u64,
    pub size: u64,
}

impl BufferBarrier {
    /// Barrier over the whole buffer.
    pub fn new(
        buffer: BufferHandle,
        src_stages: PipelineStages,
        src_access: AccessFlags,
        dst_stages: PipelineStages,
        dst_access: AccessFlags,
    ) -> Self {
        Self {
            buffer,
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            offset: 0,
            size: WHOLE_SIZE,
        }
    }
}

/// Batch of barriers submitted with a single pipeline barrier command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    pub image_barriers: Vec<ImageBarrier>,
    pub buffer_barriers: Vec<BufferBarrier>,
}

impl DependencyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(barrier: ImageBarrier) -> Self {
        Self {
            image_barriers: vec![barrier],
            buffer_barriers: Vec::new(),
        }
    }

    pub fn buffer(barrier: BufferBarrier) -> Self {
        Self {
            image_barriers: Vec::new(),
            buffer_barriers: vec![barrier],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.buffer_barriers.clear();
    }
}

/// One descriptor bound through push descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: BufferHandle,
    },
    StorageBuffer {
        binding: u32,
        buffer: BufferHandle,
    },
    /// `mip` selects a single-mip view of layer 0; `None` binds the full view.
    CombinedImageSampler {
        binding: u32,
        image: ImageHandle,
        mip: Option<u32>,
        sampler: SamplerHandle,
        layout: ImageLayout,
    },
    StorageImage {
        binding: u32,
        image: ImageHandle,
        mip: Option<u32>,
        layout: ImageLayout,
    },
}

impl DescriptorWrite {
    pub fn binding(&self) -> u32 {
        match *self {
            Self::UniformBuffer { binding, .. }
            | Self::StorageBuffer { binding, .. }
            | Self::CombinedImageSampler { binding, .. }
            | Self::StorageImage { binding, .. } => binding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Attachment used by dynamic rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub image: ImageHandle,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub clear_value: ClearValue,
}

impl RenderingAttachment {
    pub fn color(image: ImageHandle, load_op: LoadOp) -> Self {
        Self {
            image,
            layout: ImageLayout::ColorAttachmentOptimal,
            load_op,
            clear_value: ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
        }
    }

    pub fn depth(image: ImageHandle, load_op: LoadOp, clear_depth: f32) -> Self {
        Self {
            image,
            layout: ImageLayout::DepthStencilAttachmentOptimal,
            load_op,
            clear_value: ClearValue::DepthStencil {
                depth: clear_depth,
                stencil: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderingInfo {
    pub area: Rect2D,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

/// Command buffer recording interface.
///
/// Recording is single threaded: one recorder is driven by one thread for
/// the whole frame graph walk.
pub trait CommandRecorder {
    fn begin_label(&mut self, name: &str, color: LabelColor);

    fn end_label(&mut self);

    /// Submit a batch of barriers. Empty batches are skipped by implementations.
    fn pipeline_barrier(&mut self, dependency: &DependencyInfo);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor(&mut self, scissor: Rect2D);

    /// Fill `size` bytes at `offset` with the repeated 32-bit `value`.
    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32);

    fn bind_pipeline(&mut self, pipeline: &Pipeline);

    fn push_descriptors(&mut self, pipeline: &Pipeline, set: u32, writes: &[DescriptorWrite]);

    fn push_constants(&mut self, pipeline: &Pipeline, stages: ShaderStages, offset: u32, data: &[u8]);

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    fn begin_rendering(&mut self, info: &RenderingInfo);

    fn end_rendering(&mut self);

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType);

    /// Indexed indirect draw whose draw count is read from `count_buffer`.
    #[allow(clippy::too_many_arguments)]
    fn draw_indexed_indirect_count(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceHandle;

    #[test]
    fn test_image_barrier_transition_masks() {
        let barrier = ImageBarrier::transition(
            ResourceHandle::null(),
            ImageAspect::COLOR,
            ImageLayout::ColorAttachmentOptimal,
            ImageLayout::ShaderReadOnlyOptimal,
        )
        .with_mips(0, 4);

        assert_eq!(barrier.src_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst_access, AccessFlags::SHADER_READ);
        assert_eq!(barrier.mip_count, 4);
        assert_eq!(barrier.layer_count, 1);
    }

    #[test]
    fn test_dependency_info_counts() {
        let mut info = DependencyInfo::new();
        assert!(info.is_empty());

        info.buffer_barriers.push(BufferBarrier::new(
            ResourceHandle::null(),
            PipelineStages::COMPUTE_SHADER,
            AccessFlags::SHADER_WRITE,
            PipelineStages::DRAW_INDIRECT,
            AccessFlags::MEMORY_READ,
        ));
        assert_eq!(info.len(), 1);
        assert_eq!(info.buffer_barriers[0].size, WHOLE_SIZE);

        info.clear();
        assert!(info.is_empty());
    }
}
