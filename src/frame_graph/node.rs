//! Frame graph nodes and the render pass contract

use std::fmt;

use glam::Vec3;

use crate::backend::{
    CommandRecorder, DependencyInfo, LabelColor, PipelineStages, Rect2D, Viewport,
};
use crate::resources::{BufferHandle, ImageHandle};
use crate::scene::RenderSceneDescription;

use super::resource::*;

/// GPU work scheduled by a frame graph node.
///
/// The graph only borrows passes; they must outlive it.
pub trait FrameGraphRenderPass {
    /// Record this pass's commands. Barriers, viewport and scissor have
    /// already been emitted by the graph.
    fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
    );
}

/// Queue a node runs on. Compute nodes get no viewport or scissor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameGraphRenderPassType {
    #[default]
    Graphics,
    Compute,
}

/// Index of a node inside its [`FrameGraph`](super::FrameGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameGraphNodeHandle(pub(crate) u32);

impl FrameGraphNodeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Declaration of a node, consumed by [`FrameGraph::add_node`](super::FrameGraph::add_node).
pub struct FrameGraphNodeCreation<'p> {
    pub(crate) render_pass: &'p dyn FrameGraphRenderPass,
    pub(crate) queue_type: FrameGraphRenderPassType,
    pub(crate) name: String,
    pub(crate) debug_color: LabelColor,
    pub(crate) enabled: bool,
    pub(crate) inputs: Vec<FrameGraphResourceCreation>,
    pub(crate) outputs: Vec<FrameGraphResourceCreation>,
}

impl<'p> FrameGraphNodeCreation<'p> {
    pub fn new(render_pass: &'p dyn FrameGraphRenderPass, queue_type: FrameGraphRenderPassType) -> Self {
        Self {
            render_pass,
            queue_type,
            name: String::new(),
            debug_color: Vec3::ONE,
            enabled: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input_image(&mut self, image: ImageHandle, ty: FrameGraphResourceType) -> &mut Self {
        self.inputs.push(FrameGraphResourceCreation {
            ty,
            info: FrameGraphResourceInfo::Image(image),
        });
        self
    }

    /// `stage_usage` are the stages of this node that read the buffer.
    pub fn add_input_buffer(
        &mut self,
        buffer: BufferHandle,
        ty: FrameGraphResourceType,
        stage_usage: PipelineStages,
    ) -> &mut Self {
        self.inputs.push(FrameGraphResourceCreation {
            ty,
            info: FrameGraphResourceInfo::Buffer {
                handle: buffer,
                stage_usage,
            },
        });
        self
    }

    pub fn add_output_image(&mut self, image: ImageHandle, ty: FrameGraphResourceType) -> &mut Self {
        self.outputs.push(FrameGraphResourceCreation {
            ty,
            info: FrameGraphResourceInfo::Image(image),
        });
        self
    }

    /// `stage_usage` are the stages of this node that write the buffer.
    pub fn add_output_buffer(
        &mut self,
        buffer: BufferHandle,
        ty: FrameGraphResourceType,
        stage_usage: PipelineStages,
    ) -> &mut Self {
        self.outputs.push(FrameGraphResourceCreation {
            ty,
            info: FrameGraphResourceInfo::Buffer {
                handle: buffer,
                stage_usage,
            },
        });
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_debug_color(&mut self, color: LabelColor) -> &mut Self {
        self.debug_color = color;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for FrameGraphNodeCreation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGraphNodeCreation")
            .field("name", &self.name)
            .field("queue_type", &self.queue_type)
            .field("enabled", &self.enabled)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A scheduled unit of GPU work.
pub struct FrameGraphNode<'p> {
    pub(crate) render_pass: &'p dyn FrameGraphRenderPass,
    pub(crate) queue_type: FrameGraphRenderPassType,
    pub(crate) name: String,
    pub(crate) debug_color: LabelColor,
    pub(crate) enabled: bool,
    pub(crate) inputs: Vec<FrameGraphResourceHandle>,
    pub(crate) outputs: Vec<FrameGraphResourceHandle>,
    /// Nodes consuming an output of this node
    pub(crate) edges: Vec<FrameGraphNodeHandle>,
    pub(crate) viewport: Viewport,
    pub(crate) scissor: Rect2D,
    pub(crate) dependency_info: DependencyInfo,
}

impl<'p> FrameGraphNode<'p> {
    pub(crate) fn new(creation: &FrameGraphNodeCreation<'p>) -> Self {
        Self {
            render_pass: creation.render_pass,
            queue_type: creation.queue_type,
            name: creation.name.clone(),
            debug_color: creation.debug_color,
            enabled: creation.enabled,
            inputs: Vec::with_capacity(creation.inputs.len()),
            outputs: Vec::with_capacity(creation.outputs.len()),
            edges: Vec::new(),
            viewport: Viewport::default(),
            scissor: Rect2D::default(),
            dependency_info: DependencyInfo::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug_color(&self) -> LabelColor {
        self.debug_color
    }

    pub fn queue_type(&self) -> FrameGraphRenderPassType {
        self.queue_type
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn inputs(&self) -> &[FrameGraphResourceHandle] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FrameGraphResourceHandle] {
        &self.outputs
    }

    pub fn edges(&self) -> &[FrameGraphNodeHandle] {
        &self.edges
    }

    /// Viewport computed by the last build. Only meaningful for graphics nodes.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> Rect2D {
        self.scissor
    }

    /// Barriers emitted right before the node records.
    pub fn dependency_info(&self) -> &DependencyInfo {
        &self.dependency_info
    }

    pub fn render_pass(&self) -> &'p dyn FrameGraphRenderPass {
        self.render_pass
    }
}

impl fmt::Debug for FrameGraphNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGraphNode")
            .field("name", &self.name)
            .field("queue_type", &self.queue_type)
            .field("enabled", &self.enabled)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("edges", &self.edges)
            .field("viewport", &self.viewport)
            .field("dependency_info", &self.dependency_info)
            .finish_non_exhaustive()
    }
}
