//! Frame graph integration tests.
//!
//! Graphs are built against resources of the dummy backend and recorded
//! into a [`CommandList`], so both the precomputed schedule and the emitted
//! command stream can be checked.

mod common;

use rstest::rstest;

use common::{scene, DispatchPass, NoopPass, TestScene};
use redlilium_renderer::backend::{
    AccessFlags, CommandList, Extent2D, ImageAspect, ImageLayout, PipelineStages, Rect2D,
    RecordedCommand, Viewport,
};
use redlilium_renderer::frame_graph::{
    FrameGraph, FrameGraphNodeCreation, FrameGraphRenderPassType, FrameGraphResourceType,
};
use redlilium_renderer::RendererError;

fn sorted_names<'a>(graph: &'a FrameGraph<'_>) -> Vec<&'a str> {
    graph
        .sorted_nodes()
        .iter()
        .map(|handle| graph.node(*handle).name())
        .collect()
}

fn position(names: &[&str], name: &str) -> usize {
    names
        .iter()
        .position(|n| *n == name)
        .unwrap_or_else(|| panic!("node '{name}' is not scheduled"))
}

// ============================================================================
// Scheduling
// ============================================================================

/// Shadow and geometry passes feed a lighting pass.
#[rstest]
fn test_shadow_geometry_lighting_example(mut scene: TestScene) {
    let shadow_map = scene.depth_target("ShadowMap", 2048, 2048);
    let gbuffer = scene.color_target("GBuffer", 1280, 720);
    let hdr = scene.color_target("HDRColor", 1280, 720);
    let pass = NoopPass;

    let mut graph = FrameGraph::new(Extent2D::new(1280, 720));
    let resources = scene.context.resources();

    // lighting is declared first to exercise sorting
    let mut lighting = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    lighting
        .set_name("LightingPass")
        .add_input_image(shadow_map, FrameGraphResourceType::TEXTURE)
        .add_input_image(gbuffer, FrameGraphResourceType::TEXTURE)
        .add_output_image(hdr, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&lighting, resources).unwrap();

    let mut shadow = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    shadow
        .set_name("ShadowPass")
        .add_output_image(shadow_map, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&shadow, resources).unwrap();

    let mut geometry = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    geometry
        .set_name("GeometryPass")
        .add_output_image(gbuffer, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&geometry, resources).unwrap();

    graph.build(resources).unwrap();

    let names = sorted_names(&graph);
    assert_eq!(names.len(), 3);
    assert!(position(&names, "ShadowPass") < position(&names, "LightingPass"));
    assert!(position(&names, "GeometryPass") < position(&names, "LightingPass"));

    let lighting = graph.node_by_name("LightingPass").unwrap();
    let barriers = &lighting.dependency_info().image_barriers;
    assert_eq!(barriers.len(), 3);

    assert_eq!(barriers[0].image, shadow_map);
    assert_eq!(barriers[0].aspect, ImageAspect::DEPTH);
    assert_eq!(barriers[0].old_layout, ImageLayout::DepthStencilAttachmentOptimal);
    assert_eq!(barriers[0].new_layout, ImageLayout::ShaderReadOnlyOptimal);

    assert_eq!(barriers[1].image, gbuffer);
    assert_eq!(barriers[1].old_layout, ImageLayout::ColorAttachmentOptimal);

    assert_eq!(barriers[2].image, hdr);
    assert_eq!(barriers[2].old_layout, ImageLayout::Undefined);
    assert_eq!(barriers[2].new_layout, ImageLayout::ColorAttachmentOptimal);
}

#[rstest]
fn test_producers_precede_consumers(mut scene: TestScene) {
    // a -> b -> d, a -> c -> d, c -> e, d -> f, e -> f
    let a = scene.color_target("A", 64, 64);
    let b = scene.color_target("B", 64, 64);
    let c = scene.storage_buffer("C");
    let d = scene.color_target("D", 64, 64);
    let e = scene.storage_buffer("E");
    let f = scene.color_target("F", 64, 64);
    let pass = NoopPass;
    let compute = FrameGraphRenderPassType::Compute;
    let graphics = FrameGraphRenderPassType::Graphics;
    let texture = FrameGraphResourceType::TEXTURE;
    let attachment = FrameGraphResourceType::ATTACHMENT;
    let buffer = FrameGraphResourceType::BUFFER;
    let cs = PipelineStages::COMPUTE_SHADER;

    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    let resources = scene.context.resources();

    let mut node = FrameGraphNodeCreation::new(&pass, graphics);
    node.set_name("F")
        .add_input_image(d, texture)
        .add_input_buffer(e, buffer, PipelineStages::FRAGMENT_SHADER)
        .add_output_image(f, attachment);
    graph.add_node(&node, resources).unwrap();

    let mut node = FrameGraphNodeCreation::new(&pass, compute);
    node.set_name("E")
        .add_input_buffer(c, buffer, cs)
        .add_output_buffer(e, buffer, cs);
    graph.add_node(&node, resources).unwrap();

    let mut node = FrameGraphNodeCreation::new(&pass, graphics);
    node.set_name("D")
        .add_input_image(b, texture)
        .add_input_buffer(c, buffer, PipelineStages::FRAGMENT_SHADER)
        .add_output_image(d, attachment);
    graph.add_node(&node, resources).unwrap();

    let mut node = FrameGraphNodeCreation::new(&pass, compute);
    node.set_name("C")
        .add_input_image(a, texture)
        .add_output_buffer(c, buffer, cs);
    graph.add_node(&node, resources).unwrap();

    let mut node = FrameGraphNodeCreation::new(&pass, graphics);
    node.set_name("B").add_input_image(a, texture).add_output_image(b, attachment);
    graph.add_node(&node, resources).unwrap();

    let mut node = FrameGraphNodeCreation::new(&pass, graphics);
    node.set_name("A").add_output_image(a, attachment);
    graph.add_node(&node, resources).unwrap();

    graph.build(resources).unwrap();

    let names = sorted_names(&graph);
    assert_eq!(names.len(), 6);
    for node in graph.nodes() {
        for consumer in node.edges() {
            let consumer = graph.node(*consumer).name();
            assert!(
                position(&names, node.name()) < position(&names, consumer),
                "'{}' must run before '{consumer}'",
                node.name()
            );
        }
    }

    // a is transitioned once for both of its readers
    let a_barriers = ["B", "C"]
        .iter()
        .flat_map(|name| &graph.node_by_name(name).unwrap().dependency_info().image_barriers)
        .filter(|barrier| barrier.image == a)
        .count();
    assert_eq!(a_barriers, 1);
}

#[rstest]
fn test_buffer_barrier_uses_both_stage_usages(mut scene: TestScene) {
    let buffer = scene.storage_buffer("Particles");
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    let resources = scene.context.resources();

    let mut simulate = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Compute);
    simulate.set_name("Simulate").add_output_buffer(
        buffer,
        FrameGraphResourceType::BUFFER,
        PipelineStages::COMPUTE_SHADER,
    );
    graph.add_node(&simulate, resources).unwrap();

    let mut draw = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    draw.set_name("Draw").add_input_buffer(
        buffer,
        FrameGraphResourceType::BUFFER,
        PipelineStages::VERTEX_SHADER,
    );
    graph.add_node(&draw, resources).unwrap();

    graph.build(resources).unwrap();

    let barriers = &graph.node_by_name("Draw").unwrap().dependency_info().buffer_barriers;
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].buffer, buffer);
    assert_eq!(barriers[0].src_stages, PipelineStages::COMPUTE_SHADER);
    assert_eq!(barriers[0].src_access, AccessFlags::SHADER_WRITE);
    assert_eq!(barriers[0].dst_stages, PipelineStages::VERTEX_SHADER);
    assert_eq!(barriers[0].dst_access, AccessFlags::MEMORY_READ);
}

/// Transparent objects are drawn over the opaque HDR target through a
/// Reference; tonemapping, declared later, must see the blended result.
#[rstest]
fn test_reference_rewrite_precedes_later_readers(mut scene: TestScene) {
    let hdr = scene.color_target("HDR", 1280, 720);
    let luminance = scene.storage_buffer("Luminance");
    let pass = NoopPass;
    let graphics = FrameGraphRenderPassType::Graphics;
    let hdr_reference = FrameGraphResourceType::ATTACHMENT | FrameGraphResourceType::REFERENCE;

    let mut graph = FrameGraph::new(Extent2D::new(1280, 720));
    let resources = scene.context.resources();

    let mut opaque = FrameGraphNodeCreation::new(&pass, graphics);
    opaque
        .set_name("Opaque")
        .add_output_image(hdr, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&opaque, resources).unwrap();

    let mut exposure = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Compute);
    exposure
        .set_name("Exposure")
        .add_input_image(hdr, FrameGraphResourceType::TEXTURE)
        .add_output_buffer(luminance, FrameGraphResourceType::BUFFER, PipelineStages::COMPUTE_SHADER);
    graph.add_node(&exposure, resources).unwrap();

    let mut transparent = FrameGraphNodeCreation::new(&pass, graphics);
    transparent
        .set_name("Transparent")
        .add_input_image(hdr, hdr_reference)
        .add_input_buffer(luminance, FrameGraphResourceType::BUFFER, PipelineStages::FRAGMENT_SHADER)
        .add_output_image(hdr, hdr_reference);
    graph.add_node(&transparent, resources).unwrap();

    let mut tonemap = FrameGraphNodeCreation::new(&pass, graphics);
    tonemap
        .set_name("Tonemap")
        .add_input_image(hdr, FrameGraphResourceType::TEXTURE);
    graph.add_node(&tonemap, resources).unwrap();

    graph.build(resources).unwrap();
    assert_eq!(sorted_names(&graph), ["Opaque", "Exposure", "Transparent", "Tonemap"]);

    // the Reference input itself takes no part in barriers
    let transparent = graph.node_by_name("Transparent").unwrap().dependency_info();
    assert!(transparent.image_barriers.is_empty());
    assert_eq!(transparent.buffer_barriers.len(), 1);

    // HDR was read by Exposure already, but Transparent wrote it since
    let barriers = &graph.node_by_name("Tonemap").unwrap().dependency_info().image_barriers;
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].image, hdr);
    assert_eq!(barriers[0].old_layout, ImageLayout::ColorAttachmentOptimal);
    assert_eq!(barriers[0].new_layout, ImageLayout::ShaderReadOnlyOptimal);

    graph.set_node_enabled("Transparent", false);
    graph.build(resources).unwrap();
    assert_eq!(sorted_names(&graph), ["Opaque", "Exposure", "Tonemap"]);
    assert!(graph.node_by_name("Tonemap").unwrap().dependency_info().is_empty());
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
fn test_second_producer_is_rejected(mut scene: TestScene) {
    let target = scene.color_target("HDR", 64, 64);
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    let resources = scene.context.resources();

    let mut first = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    first.set_name("Opaque").add_output_image(target, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&first, resources).unwrap();

    let mut second = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    second.set_name("Transparent").add_output_image(target, FrameGraphResourceType::ATTACHMENT);
    let err = graph.add_node(&second, resources).unwrap_err();

    assert_eq!(
        err,
        RendererError::DuplicateProducer {
            resource: "HDR".into(),
            first: "Opaque".into(),
            second: "Transparent".into(),
        }
    );
    assert_eq!(graph.nodes().len(), 1);

    // the same output as a Reference is accepted
    let mut reference = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    reference
        .set_name("Transparent")
        .add_input_image(target, FrameGraphResourceType::ATTACHMENT)
        .add_output_image(target, FrameGraphResourceType::ATTACHMENT | FrameGraphResourceType::REFERENCE);
    graph.add_node(&reference, resources).unwrap();
    graph.build(resources).unwrap();
    assert_eq!(sorted_names(&graph), ["Opaque", "Transparent"]);
}

#[rstest]
fn test_input_without_producer_fails_build(mut scene: TestScene) {
    let orphan = scene.color_target("Bloom", 64, 64);
    let output = scene.color_target("LDR", 64, 64);
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    let resources = scene.context.resources();

    let mut tonemap = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    tonemap
        .set_name("Tonemapping")
        .add_input_image(orphan, FrameGraphResourceType::TEXTURE)
        .add_output_image(output, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&tonemap, resources).unwrap();

    let err = graph.build(resources).unwrap_err();
    assert_eq!(
        err,
        RendererError::MissingProducer {
            resource: "Bloom".into(),
            consumer: "Tonemapping".into(),
        }
    );
    assert!(err.to_string().contains("Bloom"));
}

#[rstest]
fn test_stale_handle_is_rejected(mut scene: TestScene) {
    let target = scene.color_target("Old", 64, 64);
    scene.context.resources_mut().images.destroy(target);
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));

    let mut node = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    node.set_name("Stale").add_output_image(target, FrameGraphResourceType::ATTACHMENT);
    let err = graph.add_node(&node, scene.context.resources()).unwrap_err();

    assert_eq!(err, RendererError::InvalidHandle { kind: "image" });
    assert!(graph.nodes().is_empty());
}

#[rstest]
fn test_buffer_declared_as_texture_is_unsupported(mut scene: TestScene) {
    let buffer = scene.storage_buffer("Lights");
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));

    let mut node = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Compute);
    node.set_name("Cull").add_output_buffer(
        buffer,
        FrameGraphResourceType::TEXTURE,
        PipelineStages::COMPUTE_SHADER,
    );
    let err = graph.add_node(&node, scene.context.resources()).unwrap_err();
    assert!(matches!(err, RendererError::UnsupportedResourceType { .. }));
}

// ============================================================================
// Rebuilds
// ============================================================================

#[rstest]
fn test_rebuild_is_deterministic(mut scene: TestScene) {
    let depth = scene.depth_target("Depth", 128, 128);
    let color = scene.color_target("Color", 128, 128);
    let buffer = scene.storage_buffer("Visible Lights");
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(128, 128));
    let resources = scene.context.resources();

    let mut prepass = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    prepass.set_name("Depth Prepass").add_output_image(depth, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&prepass, resources).unwrap();

    let mut cull = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Compute);
    cull.set_name("Light Culling")
        .add_input_image(depth, FrameGraphResourceType::TEXTURE)
        .add_output_buffer(buffer, FrameGraphResourceType::BUFFER, PipelineStages::COMPUTE_SHADER);
    graph.add_node(&cull, resources).unwrap();

    let mut forward = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    forward
        .set_name("Forward")
        .add_input_buffer(buffer, FrameGraphResourceType::BUFFER, PipelineStages::FRAGMENT_SHADER)
        .add_output_image(color, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&forward, resources).unwrap();

    graph.build(resources).unwrap();
    let order = graph.sorted_nodes().to_vec();
    let barriers: Vec<_> = graph.nodes().iter().map(|node| node.dependency_info().clone()).collect();

    graph.build(resources).unwrap();
    assert_eq!(graph.sorted_nodes(), order.as_slice());
    let rebuilt: Vec<_> = graph.nodes().iter().map(|node| node.dependency_info().clone()).collect();
    assert_eq!(rebuilt, barriers);
    assert_eq!(sorted_names(&graph), ["Depth Prepass", "Light Culling", "Forward"]);
}

#[rstest]
fn test_disabled_node_is_skipped_until_enabled(mut scene: TestScene) {
    let color = scene.color_target("Color", 64, 64);
    let debug = scene.color_target("Debug Overlay", 64, 64);
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    let resources = scene.context.resources();

    let mut main = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    main.set_name("Main").add_output_image(color, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&main, resources).unwrap();

    let mut overlay = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    overlay
        .set_name("Overlay")
        .set_enabled(false)
        .add_input_image(color, FrameGraphResourceType::TEXTURE)
        .add_output_image(debug, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&overlay, resources).unwrap();

    graph.build(resources).unwrap();
    assert_eq!(sorted_names(&graph), ["Main"]);
    assert!(graph.node_by_name("Main").unwrap().edges().is_empty());

    assert!(graph.set_node_enabled("Overlay", true));
    graph.build(resources).unwrap();
    assert_eq!(sorted_names(&graph), ["Main", "Overlay"]);

    assert!(!graph.set_node_enabled("Missing", true));
}

#[rstest]
fn test_empty_graph_builds(scene: TestScene) {
    let mut graph = FrameGraph::new(Extent2D::new(64, 64));
    graph.build(scene.context.resources()).unwrap();
    assert!(graph.sorted_nodes().is_empty());

    let mut cmd = CommandList::new();
    graph.record_commands(&mut cmd, 0, &scene.description());
    assert!(cmd.is_empty());
}

// ============================================================================
// Viewports and recording
// ============================================================================

#[rstest]
#[case::swapchain(false, false, Extent2D::new(1920, 1080))]
#[case::input_attachment(true, false, Extent2D::new(256, 128))]
#[case::output_attachment(false, true, Extent2D::new(512, 512))]
#[case::output_overrides_input(true, true, Extent2D::new(512, 512))]
fn test_graphics_viewport(
    mut scene: TestScene,
    #[case] with_input: bool,
    #[case] with_output: bool,
    #[case] expected: Extent2D,
) {
    let input = scene.color_target("Input", 256, 128);
    let output = scene.color_target("Output", 512, 512);
    let pass = NoopPass;
    let mut graph = FrameGraph::new(Extent2D::new(1920, 1080));
    let resources = scene.context.resources();

    if with_input {
        let mut producer = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
        producer.set_name("Producer").add_output_image(input, FrameGraphResourceType::ATTACHMENT);
        graph.add_node(&producer, resources).unwrap();
    }

    let mut node = FrameGraphNodeCreation::new(&pass, FrameGraphRenderPassType::Graphics);
    node.set_name("Subject");
    if with_input {
        node.add_input_image(input, FrameGraphResourceType::ATTACHMENT);
    }
    if with_output {
        node.add_output_image(output, FrameGraphResourceType::ATTACHMENT);
    }
    graph.add_node(&node, resources).unwrap();
    graph.build(resources).unwrap();

    let subject = graph.node_by_name("Subject").unwrap();
    assert_eq!(subject.viewport(), Viewport::from_extent(expected));
    assert_eq!(subject.scissor(), Rect2D::from_extent(expected));
}

#[rstest]
fn test_recording_order(mut scene: TestScene) {
    let color = scene.color_target("Scene Color", 320, 240);
    let buffer = scene.storage_buffer("Histogram");
    let graphics_pass = NoopPass;
    let compute_pass = DispatchPass;
    let mut graph = FrameGraph::new(Extent2D::new(1920, 1080));
    let resources = scene.context.resources();

    let mut histogram = FrameGraphNodeCreation::new(&compute_pass, FrameGraphRenderPassType::Compute);
    histogram
        .set_name("Luminance Histogram")
        .add_input_image(color, FrameGraphResourceType::TEXTURE)
        .add_output_buffer(buffer, FrameGraphResourceType::BUFFER, PipelineStages::COMPUTE_SHADER);
    graph.add_node(&histogram, resources).unwrap();

    let mut opaque = FrameGraphNodeCreation::new(&graphics_pass, FrameGraphRenderPassType::Graphics);
    opaque.set_name("Opaque").add_output_image(color, FrameGraphResourceType::ATTACHMENT);
    graph.add_node(&opaque, resources).unwrap();

    graph.build(resources).unwrap();

    let mut cmd = CommandList::new();
    graph.record_commands(&mut cmd, 0, &scene.description());
    assert_eq!(cmd.labels(), ["Opaque", "Luminance Histogram"]);

    let opaque = cmd.commands_in_label("Opaque");
    assert_eq!(opaque.len(), 3);
    assert!(matches!(opaque[0], RecordedCommand::PipelineBarrier(_)));
    assert_eq!(
        opaque[1],
        RecordedCommand::SetViewport(Viewport::from_extent(Extent2D::new(320, 240)))
    );
    assert!(matches!(opaque[2], RecordedCommand::SetScissor(_)));

    // compute nodes get no viewport
    let histogram = cmd.commands_in_label("Luminance Histogram");
    assert_eq!(histogram.len(), 2);
    let RecordedCommand::PipelineBarrier(dependency) = &histogram[0] else {
        panic!("expected a barrier, got {:?}", histogram[0]);
    };
    assert_eq!(dependency.image_barriers[0].new_layout, ImageLayout::ShaderReadOnlyOptimal);
    assert_eq!(histogram[1], RecordedCommand::Dispatch { x: 1, y: 1, z: 1 });
}
