//! Resources flowing between frame graph nodes

use bitflags::bitflags;

use crate::backend::PipelineStages;
use crate::error::{RendererError, RendererResult};
use crate::resources::{BufferHandle, GpuResources, ImageHandle};

use super::node::FrameGraphNodeHandle;

bitflags! {
    /// How a node uses a resource.
    ///
    /// Barriers are only synthesized for the exact types `ATTACHMENT` (outputs),
    /// `TEXTURE` and `BUFFER` (inputs). Combining a type with `REFERENCE`
    /// declares a dependency without taking part in barrier generation, and a
    /// `REFERENCE` output does not claim its resource name. Readers declared
    /// after a `REFERENCE` output are ordered after it, and their barriers
    /// wait on that rewrite.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameGraphResourceType: u32 {
        const ATTACHMENT = 1 << 0;
        const TEXTURE = 1 << 1;
        const BUFFER = 1 << 2;
        const REFERENCE = 1 << 3;
    }
}

/// Index of a resource inside its [`FrameGraph`](super::FrameGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameGraphResourceHandle(pub(crate) u32);

impl FrameGraphResourceHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// GPU object behind a frame graph resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameGraphResourceInfo {
    Image(ImageHandle),
    /// A buffer and the pipeline stages that access it.
    Buffer {
        handle: BufferHandle,
        stage_usage: PipelineStages,
    },
}

impl FrameGraphResourceInfo {
    pub fn image(&self) -> Option<ImageHandle> {
        match *self {
            FrameGraphResourceInfo::Image(handle) => Some(handle),
            FrameGraphResourceInfo::Buffer { .. } => None,
        }
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        match *self {
            FrameGraphResourceInfo::Buffer { handle, .. } => Some(handle),
            FrameGraphResourceInfo::Image(_) => None,
        }
    }

    pub fn stage_usage(&self) -> PipelineStages {
        match *self {
            FrameGraphResourceInfo::Buffer { stage_usage, .. } => stage_usage,
            FrameGraphResourceInfo::Image(_) => PipelineStages::empty(),
        }
    }
}

/// Declaration of an input or output on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGraphResourceCreation {
    pub ty: FrameGraphResourceType,
    pub info: FrameGraphResourceInfo,
}

impl FrameGraphResourceCreation {
    /// Name of the underlying GPU object, which is the producer/consumer
    /// matching key.
    pub(crate) fn resolve_name(&self, resources: &GpuResources) -> RendererResult<String> {
        let unsupported = || RendererError::UnsupportedResourceType {
            resource: format!("{:?}", self.info),
        };

        if self
            .ty
            .intersects(FrameGraphResourceType::ATTACHMENT | FrameGraphResourceType::TEXTURE)
        {
            let handle = self.info.image().ok_or_else(unsupported)?;
            let image = resources
                .images
                .get(handle)
                .ok_or(RendererError::InvalidHandle { kind: "image" })?;
            Ok(image.name.clone())
        } else if self.ty.contains(FrameGraphResourceType::BUFFER) {
            let handle = self.info.buffer().ok_or_else(unsupported)?;
            let buffer = resources
                .buffers
                .get(handle)
                .ok_or(RendererError::InvalidHandle { kind: "buffer" })?;
            Ok(buffer.name.clone())
        } else {
            Err(unsupported())
        }
    }
}

/// One named resource of the graph.
///
/// Outputs are created by [`FrameGraph::add_node`](super::FrameGraph::add_node)
/// with their producer filled in. Inputs start as placeholders carrying only
/// the name and type; `build` links them to the producing output.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGraphResource {
    pub name: String,
    pub ty: FrameGraphResourceType,
    pub info: FrameGraphResourceInfo,
    /// Node producing this resource, set for outputs and resolved inputs.
    pub producer: Option<FrameGraphNodeHandle>,
    /// Output resource of the producer, the key of barrier state tracking.
    pub output: Option<FrameGraphResourceHandle>,
}

impl FrameGraphResource {
    pub fn image(&self) -> Option<ImageHandle> {
        self.info.image()
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.info.buffer()
    }

    pub fn is_reference(&self) -> bool {
        self.ty.contains(FrameGraphResourceType::REFERENCE)
    }
}
