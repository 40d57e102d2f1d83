//! Frame graph construction, scheduling and barrier synthesis

use std::collections::HashMap;

use crate::backend::{
    AccessFlags, BufferBarrier, CommandRecorder, DependencyInfo, Extent2D, ImageAspect,
    ImageBarrier, ImageLayout, ImageUsage, Rect2D, Viewport,
};
use crate::error::{RendererError, RendererResult};
use crate::resources::{GpuResources, Image, ImageHandle};
use crate::scene::RenderSceneDescription;

use super::node::*;
use super::resource::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    NotProcessed,
    Visited,
    Added,
}

/// Declarative description of a frame's passes and the resources between them.
///
/// Nodes are added once; [`build`](Self::build) links inputs to producers,
/// sorts the nodes and precomputes one barrier batch per node.
/// [`record_commands`](Self::record_commands) replays the result every frame.
/// Rebuild whenever nodes are added, enabled or disabled.
///
/// A Reference output rewrites a resource another node produces. Nodes
/// declared after the rewriting node that read the resource run after it
/// and synchronize with the rewrite, so declaration order fixes the order
/// of successive rewrites.
pub struct FrameGraph<'p> {
    nodes: Vec<FrameGraphNode<'p>>,
    resources: Vec<FrameGraphResource>,
    /// Name of every non-Reference output to the resource producing it
    output_map: HashMap<String, FrameGraphResourceHandle>,
    /// Name of every Reference output to its writers, in declaration order
    reference_writers: HashMap<String, Vec<FrameGraphResourceHandle>>,
    sorted_nodes: Vec<FrameGraphNodeHandle>,
    swapchain_extent: Extent2D,
}

impl<'p> FrameGraph<'p> {
    pub fn new(swapchain_extent: Extent2D) -> Self {
        Self {
            nodes: Vec::new(),
            resources: Vec::new(),
            output_map: HashMap::new(),
            reference_writers: HashMap::new(),
            sorted_nodes: Vec::new(),
            swapchain_extent,
        }
    }

    /// Register a node.
    ///
    /// Fails if an output is not backed by a GPU object of its declared type,
    /// or if a non-Reference output is already produced by another node. A
    /// failed call leaves the graph untouched.
    pub fn add_node(
        &mut self,
        creation: &FrameGraphNodeCreation<'p>,
        resources: &GpuResources,
    ) -> RendererResult<&mut Self> {
        let output_names = creation
            .outputs
            .iter()
            .map(|output| output.resolve_name(resources))
            .collect::<RendererResult<Vec<_>>>()?;
        let input_names = creation
            .inputs
            .iter()
            .map(|input| input.resolve_name(resources))
            .collect::<RendererResult<Vec<_>>>()?;

        for (index, (output, name)) in creation.outputs.iter().zip(&output_names).enumerate() {
            if output.ty.contains(FrameGraphResourceType::REFERENCE) {
                continue;
            }
            if let Some(&existing) = self.output_map.get(name) {
                let first = self.resources[existing.index()]
                    .producer
                    .map(|producer| self.nodes[producer.index()].name.clone())
                    .unwrap_or_default();
                return Err(RendererError::DuplicateProducer {
                    resource: name.clone(),
                    first,
                    second: creation.name.clone(),
                });
            }
            let produced_twice = creation.outputs[..index]
                .iter()
                .zip(&output_names)
                .any(|(other, other_name)| {
                    !other.ty.contains(FrameGraphResourceType::REFERENCE) && other_name == name
                });
            if produced_twice {
                return Err(RendererError::DuplicateProducer {
                    resource: name.clone(),
                    first: creation.name.clone(),
                    second: creation.name.clone(),
                });
            }
        }

        let node_handle = FrameGraphNodeHandle(self.nodes.len() as u32);
        let mut node = FrameGraphNode::new(creation);

        for (output, name) in creation.outputs.iter().zip(output_names) {
            let handle = FrameGraphResourceHandle(self.resources.len() as u32);
            if output.ty.contains(FrameGraphResourceType::REFERENCE) {
                self.reference_writers.entry(name.clone()).or_default().push(handle);
            } else {
                self.output_map.insert(name.clone(), handle);
            }
            self.resources.push(FrameGraphResource {
                name,
                ty: output.ty,
                info: output.info,
                producer: Some(node_handle),
                output: Some(handle),
            });
            node.outputs.push(handle);
        }

        for (input, name) in creation.inputs.iter().zip(input_names) {
            let handle = FrameGraphResourceHandle(self.resources.len() as u32);
            self.resources.push(FrameGraphResource {
                name,
                ty: input.ty,
                info: input.info,
                producer: None,
                output: None,
            });
            node.inputs.push(handle);
        }

        log::trace!(
            "Added frame graph node '{}' ({} inputs, {} outputs)",
            node.name,
            node.inputs.len(),
            node.outputs.len()
        );
        self.nodes.push(node);
        Ok(self)
    }

    /// Link inputs to producers, sort the enabled nodes and create barriers.
    pub fn build(&mut self, resources: &GpuResources) -> RendererResult<()> {
        self.process_nodes(resources)?;
        self.sort_graph();
        self.create_memory_barriers(resources)?;

        if self.sorted_nodes.is_empty() {
            log::warn!("Frame graph built without any enabled node");
        } else {
            log::debug!(
                "Built frame graph: {}",
                self.sorted_nodes
                    .iter()
                    .map(|handle| self.nodes[handle.index()].name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
        }
        Ok(())
    }

    /// Emit every sorted node: label, barriers, viewport and scissor for
    /// graphics nodes, then the node's own commands.
    pub fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        current_frame: u32,
        scene: &RenderSceneDescription<'_>,
    ) {
        for handle in &self.sorted_nodes {
            let node = &self.nodes[handle.index()];

            cmd.begin_label(&node.name, node.debug_color);
            cmd.pipeline_barrier(&node.dependency_info);

            if node.queue_type == FrameGraphRenderPassType::Graphics {
                cmd.set_viewport(node.viewport);
                cmd.set_scissor(node.scissor);
            }

            node.render_pass.record_commands(cmd, current_frame, scene);

            cmd.end_label();
        }
    }

    /// Enable or disable every node called `name`. Returns whether any node
    /// matched. Takes effect at the next build.
    pub fn set_node_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for node in self.nodes.iter_mut().filter(|node| node.name == name) {
            node.enabled = enabled;
            found = true;
        }
        found
    }

    /// Viewport size of graphics nodes without attachments. Takes effect at
    /// the next build.
    pub fn set_swapchain_extent(&mut self, extent: Extent2D) {
        self.swapchain_extent = extent;
    }

    pub fn swapchain_extent(&self) -> Extent2D {
        self.swapchain_extent
    }

    /// Remove every node and resource.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.resources.clear();
        self.output_map.clear();
        self.reference_writers.clear();
        self.sorted_nodes.clear();
    }

    /// Execution order of the last build.
    pub fn sorted_nodes(&self) -> &[FrameGraphNodeHandle] {
        &self.sorted_nodes
    }

    pub fn node(&self, handle: FrameGraphNodeHandle) -> &FrameGraphNode<'p> {
        &self.nodes[handle.index()]
    }

    pub fn node_by_name(&self, name: &str) -> Option<&FrameGraphNode<'p>> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn nodes(&self) -> &[FrameGraphNode<'p>] {
        &self.nodes
    }

    pub fn resource(&self, handle: FrameGraphResourceHandle) -> &FrameGraphResource {
        &self.resources[handle.index()]
    }

    fn process_nodes(&mut self, resources: &GpuResources) -> RendererResult<()> {
        for node in &mut self.nodes {
            node.edges.clear();
        }

        for index in 0..self.nodes.len() {
            if !self.nodes[index].enabled {
                continue;
            }
            self.compute_node_edges(index)?;
            if self.nodes[index].queue_type == FrameGraphRenderPassType::Graphics {
                self.compute_node_viewport(index, resources)?;
            }
        }
        Ok(())
    }

    fn compute_node_edges(&mut self, index: usize) -> RendererResult<()> {
        let consumer = FrameGraphNodeHandle(index as u32);

        for input_index in 0..self.nodes[index].inputs.len() {
            let input = self.nodes[index].inputs[input_index];
            let name = &self.resources[input.index()].name;

            let output = self
                .output_map
                .get(name)
                .copied()
                .filter(|output| {
                    self.resources[output.index()]
                        .producer
                        .is_some_and(|producer| self.nodes[producer.index()].enabled)
                })
                .ok_or_else(|| RendererError::MissingProducer {
                    resource: name.clone(),
                    consumer: self.nodes[index].name.clone(),
                })?;
            let producer = self.resources[output.index()].producer;
            let rewriters: Vec<FrameGraphNodeHandle> = self
                .reference_writers
                .get(name)
                .into_iter()
                .flatten()
                .filter_map(|writer| self.resources[writer.index()].producer)
                .filter(|writer| writer.index() < index && self.nodes[writer.index()].enabled)
                .collect();

            let resource = &mut self.resources[input.index()];
            resource.producer = producer;
            resource.output = Some(output);

            for writer in producer.into_iter().chain(rewriters) {
                let edges = &mut self.nodes[writer.index()].edges;
                if !edges.contains(&consumer) {
                    edges.push(consumer);
                }
            }
        }
        Ok(())
    }

    fn compute_node_viewport(&mut self, index: usize, resources: &GpuResources) -> RendererResult<()> {
        let node = &self.nodes[index];
        let mut extent = self.swapchain_extent;

        let first_input = node
            .inputs
            .iter()
            .map(|handle| &self.resources[handle.index()])
            .find(|resource| resource.ty.contains(FrameGraphResourceType::ATTACHMENT));
        if let Some(image) = first_input.and_then(FrameGraphResource::image) {
            extent = access_image(resources, image)?.extent();
        }

        // outputs define the resolution of the node
        let first_output = node
            .outputs
            .iter()
            .map(|handle| &self.resources[handle.index()])
            .find(|resource| resource.ty == FrameGraphResourceType::ATTACHMENT);
        if let Some(image) = first_output.and_then(FrameGraphResource::image) {
            extent = access_image(resources, image)?.extent();
        }

        let node = &mut self.nodes[index];
        node.viewport = Viewport::from_extent(extent);
        node.scissor = Rect2D::from_extent(extent);
        Ok(())
    }

    /// Reverse topological order through an iterative depth-first walk.
    fn sort_graph(&mut self) {
        let mut status = vec![VisitState::NotProcessed; self.nodes.len()];
        let mut reverse_sorted = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::with_capacity(self.nodes.len());

        for (index, node) in self.nodes.iter().enumerate() {
            if !node.enabled {
                continue;
            }
            stack.push(index);

            while let Some(&current) = stack.last() {
                match status[current] {
                    VisitState::Added => {
                        stack.pop();
                    }
                    VisitState::Visited => {
                        status[current] = VisitState::Added;
                        reverse_sorted.push(current);
                        stack.pop();
                    }
                    VisitState::NotProcessed => {
                        status[current] = VisitState::Visited;
                        for child in &self.nodes[current].edges {
                            match status[child.index()] {
                                VisitState::NotProcessed => stack.push(child.index()),
                                // still being processed further down the stack
                                VisitState::Visited => log::warn!(
                                    "Frame graph cycle between '{}' and '{}'",
                                    self.nodes[current].name,
                                    self.nodes[child.index()].name
                                ),
                                VisitState::Added => {}
                            }
                        }
                    }
                }
            }
        }

        self.sorted_nodes = reverse_sorted
            .into_iter()
            .rev()
            .map(|index| FrameGraphNodeHandle(index as u32))
            .collect();
    }

    fn create_memory_barriers(&mut self, resources: &GpuResources) -> RendererResult<()> {
        for node in &mut self.nodes {
            node.dependency_info.clear();
        }

        // producer output -> already transitioned for reading
        let mut transitioned: HashMap<FrameGraphResourceHandle, bool> = HashMap::new();
        // producer output -> output that wrote it last, itself or a Reference
        let mut last_writer: HashMap<FrameGraphResourceHandle, FrameGraphResourceHandle> =
            HashMap::new();

        for sorted_index in 0..self.sorted_nodes.len() {
            let node_index = self.sorted_nodes[sorted_index].index();
            let node = &self.nodes[node_index];
            let mut dependency = DependencyInfo::new();

            for input in &node.inputs {
                let resource = &self.resources[input.index()];
                let Some(output) = resource.output else {
                    continue;
                };
                if transitioned.get(&output).copied().unwrap_or(false) {
                    continue;
                }

                if resource.ty == FrameGraphResourceType::TEXTURE {
                    let Some(handle) = resource.image() else {
                        continue;
                    };
                    let image = access_image(resources, handle)?;
                    let barrier = if image.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
                        ImageBarrier::transition(
                            handle,
                            ImageAspect::DEPTH,
                            ImageLayout::DepthStencilAttachmentOptimal,
                            ImageLayout::ShaderReadOnlyOptimal,
                        )
                    } else {
                        ImageBarrier::transition(
                            handle,
                            ImageAspect::COLOR,
                            ImageLayout::ColorAttachmentOptimal,
                            ImageLayout::ShaderReadOnlyOptimal,
                        )
                    };
                    dependency.image_barriers.push(
                        barrier
                            .with_mips(0, image.mips)
                            .with_layers(0, image.layers),
                    );
                    transitioned.insert(output, true);
                } else if resource.ty == FrameGraphResourceType::BUFFER {
                    let Some(handle) = resource.buffer() else {
                        continue;
                    };
                    let writer = last_writer.get(&output).copied().unwrap_or(output);
                    let producer_output = &self.resources[writer.index()];
                    dependency.buffer_barriers.push(BufferBarrier::new(
                        handle,
                        producer_output.info.stage_usage(),
                        AccessFlags::SHADER_WRITE,
                        resource.info.stage_usage(),
                        AccessFlags::MEMORY_READ,
                    ));
                    transitioned.insert(output, true);
                }
            }

            for output in &node.outputs {
                let resource = &self.resources[output.index()];
                let written = if resource.is_reference() {
                    self.output_map.get(&resource.name).copied()
                } else {
                    Some(*output)
                };
                // a later reader has to synchronize with this write
                transitioned.insert(*output, false);
                if let Some(written) = written {
                    transitioned.insert(written, false);
                    last_writer.insert(written, *output);
                }

                if resource.ty != FrameGraphResourceType::ATTACHMENT {
                    continue;
                }
                let Some(handle) = resource.image() else {
                    continue;
                };
                let image = access_image(resources, handle)?;
                let barrier = if image.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
                    let mut aspect = ImageAspect::DEPTH;
                    if image.format.has_stencil() {
                        aspect |= ImageAspect::STENCIL;
                    }
                    ImageBarrier::transition(
                        handle,
                        aspect,
                        ImageLayout::Undefined,
                        ImageLayout::DepthStencilAttachmentOptimal,
                    )
                } else {
                    ImageBarrier::transition(
                        handle,
                        ImageAspect::COLOR,
                        ImageLayout::Undefined,
                        ImageLayout::ColorAttachmentOptimal,
                    )
                };
                dependency.image_barriers.push(
                    barrier
                        .with_mips(0, image.mips)
                        .with_layers(0, image.layers),
                );
            }

            self.nodes[node_index].dependency_info = dependency;
        }
        Ok(())
    }
}

fn access_image(resources: &GpuResources, handle: ImageHandle) -> RendererResult<&Image> {
    resources
        .images
        .get(handle)
        .ok_or(RendererError::InvalidHandle { kind: "image" })
}

impl std::fmt::Debug for FrameGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph")
            .field("nodes", &self.nodes)
            .field("resources", &self.resources)
            .field("sorted_nodes", &self.sorted_nodes)
            .field("swapchain_extent", &self.swapchain_extent)
            .finish()
    }
}
