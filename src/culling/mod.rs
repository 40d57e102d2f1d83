//! GPU-driven two-pass occlusion culling.
//!
//! Every frame a camera's draws are culled twice:
//!
//! 1. the prepass tests each draw's bounding sphere against the frustum and
//!    against the HZB built from the previous frame's depth, then the
//!    geometry pass draws the survivors;
//! 2. the HZB is rebuilt from that depth, and the draws rejected by the
//!    prepass are tested again against it and drawn on top.
//!
//! Draws that became visible this frame are therefore never lost. Draws
//! that became hidden this frame are still drawn once, until the next
//! frame's prepass sees their occluder.
//!
//! [`build_culling_graph`] registers the five nodes of this scheme with a
//! [`FrameGraph`]. The [`cpu`] module holds a reference implementation of
//! the culling decisions.

mod build_hzb;
mod camera_batch;
pub mod cpu;
mod frustum;
mod generate_draws;
mod geometry;
mod hzb;

pub use build_hzb::*;
pub use camera_batch::*;
pub use frustum::*;
pub use generate_draws::*;
pub use geometry::*;
pub use hzb::*;

use glam::Vec3;

use crate::backend::PipelineStages;
use crate::error::RendererResult;
use crate::frame_graph::{
    FrameGraph, FrameGraphNodeCreation, FrameGraphRenderPassType, FrameGraphResourceType,
};
use crate::resources::GpuResources;

const CULLING_COLOR: Vec3 = Vec3::new(0.9, 0.6, 0.1);
const GEOMETRY_COLOR: Vec3 = Vec3::new(0.2, 0.6, 0.9);
const HZB_COLOR: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// Register the culling and geometry nodes of `camera_batch` in `graph`.
///
/// Nodes are named after `name`: `"<name> Prepass Generate Draws"`,
/// `"<name> Geometry Prepass"`, `"<name> Build HZB"`,
/// `"<name> Second Pass Generate Draws"` and `"<name> Geometry Second Pass"`.
/// The culling and geometry passes are shared by both of their nodes, so
/// the graph must record them in this order every frame.
///
/// Draw and redirect buffers are produced by the prepass culling node, the
/// depth and color targets by the geometry prepass. The second-pass nodes
/// touch them through Reference resources, which order the nodes without
/// claiming production.
pub fn build_culling_graph<'p>(
    graph: &mut FrameGraph<'p>,
    resources: &GpuResources,
    camera_batch: &CameraBatch,
    generate_draws: &'p GenerateDrawsPass<'_>,
    geometry: &'p GeometryPass<'_>,
    build_hzb: &'p BuildHzbPass<'_>,
    name: &str,
) -> RendererResult<()> {
    let batches = camera_batch.draw_batches();
    let depth = camera_batch.depth_image();
    let indirect_stages = PipelineStages::DRAW_INDIRECT | PipelineStages::VERTEX_SHADER;
    let buffer_reference = FrameGraphResourceType::BUFFER | FrameGraphResourceType::REFERENCE;
    let attachment_reference =
        FrameGraphResourceType::ATTACHMENT | FrameGraphResourceType::REFERENCE;

    let mut prepass_cull = FrameGraphNodeCreation::new(generate_draws, FrameGraphRenderPassType::Compute);
    prepass_cull
        .set_name(format!("{name} Prepass Generate Draws"))
        .set_debug_color(CULLING_COLOR);
    for batch in batches {
        prepass_cull
            .add_output_buffer(batch.draw_buffer, FrameGraphResourceType::BUFFER, PipelineStages::COMPUTE_SHADER)
            .add_output_buffer(
                batch.redirect_buffer,
                FrameGraphResourceType::BUFFER,
                PipelineStages::COMPUTE_SHADER,
            );
    }
    graph.add_node(&prepass_cull, resources)?;

    let mut prepass_geometry = FrameGraphNodeCreation::new(geometry, FrameGraphRenderPassType::Graphics);
    prepass_geometry
        .set_name(format!("{name} Geometry Prepass"))
        .set_debug_color(GEOMETRY_COLOR);
    for batch in batches {
        prepass_geometry
            .add_input_buffer(batch.draw_buffer, FrameGraphResourceType::BUFFER, indirect_stages)
            .add_input_buffer(batch.redirect_buffer, FrameGraphResourceType::BUFFER, indirect_stages);
    }
    prepass_geometry.add_output_image(depth, FrameGraphResourceType::ATTACHMENT);
    for &target in geometry.color_targets() {
        prepass_geometry.add_output_image(target, FrameGraphResourceType::ATTACHMENT);
    }
    graph.add_node(&prepass_geometry, resources)?;

    let mut hzb_node = FrameGraphNodeCreation::new(build_hzb, FrameGraphRenderPassType::Compute);
    hzb_node
        .set_name(format!("{name} Build HZB"))
        .set_debug_color(HZB_COLOR)
        .add_input_image(depth, FrameGraphResourceType::TEXTURE)
        .add_output_image(camera_batch.hzb_image(), FrameGraphResourceType::TEXTURE);
    graph.add_node(&hzb_node, resources)?;

    let mut second_cull = FrameGraphNodeCreation::new(generate_draws, FrameGraphRenderPassType::Compute);
    second_cull
        .set_name(format!("{name} Second Pass Generate Draws"))
        .set_debug_color(CULLING_COLOR)
        .add_input_image(
            camera_batch.hzb_image(),
            FrameGraphResourceType::TEXTURE | FrameGraphResourceType::REFERENCE,
        );
    for batch in batches {
        second_cull
            .add_output_buffer(
                batch.visibility_buffer,
                FrameGraphResourceType::BUFFER,
                PipelineStages::COMPUTE_SHADER,
            )
            .add_output_buffer(batch.draw_buffer, buffer_reference, PipelineStages::COMPUTE_SHADER)
            .add_output_buffer(batch.redirect_buffer, buffer_reference, PipelineStages::COMPUTE_SHADER);
    }
    graph.add_node(&second_cull, resources)?;

    let mut second_geometry = FrameGraphNodeCreation::new(geometry, FrameGraphRenderPassType::Graphics);
    second_geometry
        .set_name(format!("{name} Geometry Second Pass"))
        .set_debug_color(GEOMETRY_COLOR)
        .add_input_image(depth, attachment_reference);
    for batch in batches {
        second_geometry
            .add_input_buffer(batch.visibility_buffer, FrameGraphResourceType::BUFFER, indirect_stages)
            .add_input_buffer(batch.draw_buffer, buffer_reference, indirect_stages)
            .add_input_buffer(batch.redirect_buffer, buffer_reference, indirect_stages);
    }
    second_geometry.add_output_image(depth, attachment_reference);
    for &target in geometry.color_targets() {
        second_geometry.add_output_image(target, attachment_reference);
    }
    graph.add_node(&second_geometry, resources)?;

    log::debug!("Registered culling nodes of camera batch '{}'", camera_batch.name());
    Ok(())
}
