//! Two-pass occlusion culling integration tests.
//!
//! The culling nodes of one camera are wired into a frame graph and recorded
//! on the dummy backend; the recorded streams are checked command by
//! command. The culling decisions themselves are checked with the CPU
//! reference culler on data gathered by the GPU scene.

mod common;

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use rstest::rstest;

use common::{scene, test_spirv, NoopPass, TestScene};
use redlilium_renderer::backend::{
    AccessFlags, CommandList, DependencyInfo, DescriptorWrite, Extent2D, ImageAspect, ImageLayout,
    LoadOp, PipelineStages, RecordedCommand,
};
use redlilium_renderer::culling::cpu::{DepthPyramid, TwoPassCuller};
use redlilium_renderer::culling::{
    build_culling_graph, BuildHzbPass, CameraBatch, DrawBatch, GenerateDrawsConstants,
    GenerateDrawsPass, GeometryPass,
};
use redlilium_renderer::frame_graph::{
    FrameGraphNodeCreation, FrameGraphRenderPassType, FrameGraphResourceType,
};
use redlilium_renderer::resources::{ImageHandle, SamplerHandle};
use redlilium_renderer::scene::{Camera, Projection};
use redlilium_renderer::FrameGraph;

const PREPASS_CULL: &str = "Main Prepass Generate Draws";
const PREPASS_GEOMETRY: &str = "Main Geometry Prepass";
const BUILD_HZB: &str = "Main Build HZB";
const SECOND_CULL: &str = "Main Second Pass Generate Draws";
const SECOND_GEOMETRY: &str = "Main Geometry Second Pass";
const LIGHTING: &str = "Lighting";

/// What a few recorded frames of the culling graph produced.
struct Recording {
    frames: Vec<CommandList>,
    order: Vec<String>,
    barriers: HashMap<String, DependencyInfo>,
    static_draw: DrawBatch,
    skinned_draw: DrawBatch,
    depth: ImageHandle,
    color: ImageHandle,
    hzb: ImageHandle,
    hzb_sampler: SamplerHandle,
    build_hzb_sampler: SamplerHandle,
}

/// Wire the culling graph of a 1280x720 camera and record `frame_count`
/// frames of it.
fn record(scene: &mut TestScene, frame_count: u32) -> Recording {
    record_with_lighting(scene, frame_count, None)
}

/// Like [`record`], with a lighting node declared after the culling nodes
/// when `hdr` is set. It samples the camera's color and depth and writes `hdr`.
fn record_with_lighting(scene: &mut TestScene, frame_count: u32, hdr: Option<ImageHandle>) -> Recording {
    let depth = scene.depth_target("Main Depth", 1280, 720);
    let color = scene.color_target("Main Color", 1280, 720);
    let static_geometry = scene.batch_buffer("Static");
    let skinned_geometry = scene.batch_buffer("Skinned");

    let camera_batch = CameraBatch::new(&mut scene.context, "Main", &scene.camera, depth).unwrap();
    let generate_draws = GenerateDrawsPass::new(&mut scene.context, &camera_batch, test_spirv()).unwrap();
    let build_hzb = BuildHzbPass::new(&mut scene.context, &camera_batch, test_spirv()).unwrap();
    let geometry = GeometryPass::new(
        &mut scene.context,
        &camera_batch,
        &static_geometry,
        &skinned_geometry,
        &[color],
        test_spirv(),
        test_spirv(),
    )
    .unwrap();

    let lighting_pass = NoopPass;

    let mut graph = FrameGraph::new(Extent2D::new(1280, 720));
    build_culling_graph(
        &mut graph,
        scene.context.resources(),
        &camera_batch,
        &generate_draws,
        &geometry,
        &build_hzb,
        "Main",
    )
    .unwrap();
    if let Some(hdr) = hdr {
        let mut lighting = FrameGraphNodeCreation::new(&lighting_pass, FrameGraphRenderPassType::Graphics);
        lighting
            .set_name(LIGHTING)
            .add_input_image(color, FrameGraphResourceType::TEXTURE)
            .add_input_image(depth, FrameGraphResourceType::TEXTURE)
            .add_output_image(hdr, FrameGraphResourceType::ATTACHMENT);
        graph.add_node(&lighting, scene.context.resources()).unwrap();
    }
    graph.build(scene.context.resources()).unwrap();

    let frames = (0..frame_count)
        .map(|frame| {
            let mut cmd = CommandList::new();
            graph.record_commands(&mut cmd, frame, &scene.description());
            cmd
        })
        .collect();

    Recording {
        frames,
        order: graph
            .sorted_nodes()
            .iter()
            .map(|handle| graph.node(*handle).name().to_string())
            .collect(),
        barriers: graph
            .nodes()
            .iter()
            .map(|node| (node.name().to_string(), node.dependency_info().clone()))
            .collect(),
        static_draw: *camera_batch.static_draw(),
        skinned_draw: *camera_batch.skinned_draw(),
        depth,
        color,
        hzb: camera_batch.hzb_image(),
        hzb_sampler: camera_batch.hzb_sampler(),
        build_hzb_sampler: build_hzb.sampler(),
    }
}

fn barrier(command: &RecordedCommand) -> &DependencyInfo {
    match command {
        RecordedCommand::PipelineBarrier(dependency) => dependency,
        other => panic!("expected a pipeline barrier, got {other:?}"),
    }
}

// ============================================================================
// Graph wiring
// ============================================================================

#[rstest]
fn test_culling_nodes_are_scheduled_in_pass_order(mut scene: TestScene) {
    let recording = record(&mut scene, 1);

    assert_eq!(
        recording.order,
        [PREPASS_CULL, PREPASS_GEOMETRY, BUILD_HZB, SECOND_CULL, SECOND_GEOMETRY]
    );
    assert_eq!(
        recording.frames[0].labels(),
        [PREPASS_CULL, PREPASS_GEOMETRY, BUILD_HZB, SECOND_CULL, SECOND_GEOMETRY]
    );
}

#[rstest]
fn test_culling_graph_barriers(mut scene: TestScene) {
    let recording = record(&mut scene, 1);
    let barriers = &recording.barriers;

    assert!(barriers[PREPASS_CULL].is_empty());

    // draw and redirect buffers of both classes, then depth and color outputs
    let prepass = &barriers[PREPASS_GEOMETRY];
    assert_eq!(prepass.buffer_barriers.len(), 4);
    assert!(prepass.buffer_barriers.iter().all(|b| {
        b.src_stages == PipelineStages::COMPUTE_SHADER
            && b.dst_stages == PipelineStages::DRAW_INDIRECT | PipelineStages::VERTEX_SHADER
    }));
    assert_eq!(prepass.image_barriers.len(), 2);
    assert_eq!(prepass.image_barriers[0].image, recording.depth);
    assert_eq!(prepass.image_barriers[0].new_layout, ImageLayout::DepthStencilAttachmentOptimal);
    assert_eq!(prepass.image_barriers[1].image, recording.color);

    let hzb = &barriers[BUILD_HZB];
    assert_eq!(hzb.image_barriers.len(), 1);
    assert_eq!(hzb.image_barriers[0].image, recording.depth);
    assert_eq!(hzb.image_barriers[0].aspect, ImageAspect::DEPTH);
    assert_eq!(hzb.image_barriers[0].new_layout, ImageLayout::ShaderReadOnlyOptimal);

    // the HZB is read through a Reference and stays in General
    assert!(barriers[SECOND_CULL].is_empty());

    let second = &barriers[SECOND_GEOMETRY];
    assert!(second.image_barriers.is_empty());
    let visibility: Vec<_> = second.buffer_barriers.iter().map(|b| b.buffer).collect();
    assert_eq!(
        visibility,
        [recording.static_draw.visibility_buffer, recording.skinned_draw.visibility_buffer]
    );
}

#[rstest]
fn test_reader_after_culling_graph_sees_final_targets(mut scene: TestScene) {
    let hdr = scene.color_target("HDR", 1280, 720);
    let recording = record_with_lighting(&mut scene, 1, Some(hdr));

    // the second geometry pass is the last writer of color and depth
    let expected = [PREPASS_CULL, PREPASS_GEOMETRY, BUILD_HZB, SECOND_CULL, SECOND_GEOMETRY, LIGHTING];
    assert_eq!(recording.order, expected);
    assert_eq!(recording.frames[0].labels(), expected);

    let lighting = &recording.barriers[LIGHTING];
    assert!(lighting.buffer_barriers.is_empty());
    assert_eq!(lighting.image_barriers.len(), 3);

    let color = &lighting.image_barriers[0];
    assert_eq!(color.image, recording.color);
    assert_eq!(color.old_layout, ImageLayout::ColorAttachmentOptimal);
    assert_eq!(color.new_layout, ImageLayout::ShaderReadOnlyOptimal);

    // already read once by the HZB build, transitioned again after the rewrite
    let depth = &lighting.image_barriers[1];
    assert_eq!(depth.image, recording.depth);
    assert_eq!(depth.aspect, ImageAspect::DEPTH);
    assert_eq!(depth.old_layout, ImageLayout::DepthStencilAttachmentOptimal);
    assert_eq!(depth.new_layout, ImageLayout::ShaderReadOnlyOptimal);

    let output = &lighting.image_barriers[2];
    assert_eq!(output.image, hdr);
    assert_eq!(output.old_layout, ImageLayout::Undefined);
    assert_eq!(output.new_layout, ImageLayout::ColorAttachmentOptimal);

    // the culling nodes keep their own barriers
    assert_eq!(recording.barriers[BUILD_HZB].image_barriers.len(), 1);
    assert!(recording.barriers[SECOND_GEOMETRY].image_barriers.is_empty());
}

// ============================================================================
// Generate draws
// ============================================================================

#[rstest]
fn test_generate_draws_prepass_commands(mut scene: TestScene) {
    scene.populate(3, 0);
    let recording = record(&mut scene, 1);
    let commands = recording.frames[0].commands_in_label(PREPASS_CULL);
    let static_draw = recording.static_draw;

    assert!(matches!(
        &commands[0],
        RecordedCommand::BindPipeline { pipeline, .. } if pipeline == "Main Generate Draws"
    ));
    assert_eq!(
        commands[1],
        RecordedCommand::FillBuffer {
            buffer: static_draw.redirect_buffer,
            offset: 0,
            size: 4,
            value: 0,
        }
    );
    let clear = barrier(&commands[2]);
    assert_eq!(clear.buffer_barriers[0].src_stages, PipelineStages::TRANSFER);
    assert_eq!(clear.buffer_barriers[0].src_access, AccessFlags::TRANSFER_WRITE);
    assert_eq!(clear.buffer_barriers[0].dst_stages, PipelineStages::COMPUTE_SHADER);

    let RecordedCommand::PushDescriptors { writes, .. } = &commands[3] else {
        panic!("expected push descriptors, got {:?}", commands[3]);
    };
    assert_eq!(writes.len(), 7);
    assert_eq!(
        writes[5],
        DescriptorWrite::StorageBuffer {
            binding: 5,
            buffer: static_draw.redirect_buffer,
        }
    );
    assert_eq!(
        writes[6],
        DescriptorWrite::CombinedImageSampler {
            binding: 6,
            image: recording.hzb,
            mip: None,
            sampler: recording.hzb_sampler,
            layout: ImageLayout::General,
        }
    );

    let expected = GenerateDrawsConstants {
        is_prepass: 1,
        mip_size: 2048.0,
        draw_commands_count: 3,
        draw_offset: 0,
    };
    let RecordedCommand::PushConstants { data, .. } = &commands[4] else {
        panic!("expected push constants, got {:?}", commands[4]);
    };
    assert_eq!(data.as_slice(), bytemuck::bytes_of(&expected));
    assert_eq!(commands[5], RecordedCommand::Dispatch { x: 1, y: 1, z: 1 });

    let handoff = barrier(&commands[6]);
    assert_eq!(handoff.buffer_barriers.len(), 3);
    assert_eq!(handoff.buffer_barriers[0].buffer, static_draw.visibility_buffer);
    assert_eq!(handoff.buffer_barriers[0].src_access, AccessFlags::SHADER_READ);
    assert_eq!(handoff.buffer_barriers[0].dst_stages, PipelineStages::DRAW_INDIRECT);
    assert_eq!(handoff.buffer_barriers[0].dst_access, AccessFlags::MEMORY_READ);
    assert_eq!(handoff.buffer_barriers[1].dst_access, AccessFlags::INDIRECT_COMMAND_READ);

    // no skinned draws: the count is still reset, nothing is dispatched
    assert_eq!(
        commands[7],
        RecordedCommand::FillBuffer {
            buffer: recording.skinned_draw.redirect_buffer,
            offset: 0,
            size: 4,
            value: 0,
        }
    );
    assert!(matches!(commands[8], RecordedCommand::PipelineBarrier(_)));
    assert!(matches!(commands[9], RecordedCommand::PipelineBarrier(_)));
    assert_eq!(commands.len(), 10);
}

#[rstest]
fn test_generate_draws_alternates_passes(mut scene: TestScene) {
    scene.populate(100, 70);
    let recording = record(&mut scene, 2);

    for frame in &recording.frames {
        for (label, is_prepass, visibility_access) in [
            (PREPASS_CULL, 1, AccessFlags::SHADER_READ),
            (SECOND_CULL, 0, AccessFlags::SHADER_WRITE),
        ] {
            let commands = frame.commands_in_label(label);
            let constants: Vec<GenerateDrawsConstants> = commands
                .iter()
                .filter_map(|command| match command {
                    RecordedCommand::PushConstants { data, .. } => {
                        Some(bytemuck::pod_read_unaligned(data))
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(constants.len(), 2);
            assert!(constants.iter().all(|c| c.is_prepass == is_prepass));
            assert_eq!((constants[0].draw_offset, constants[0].draw_commands_count), (0, 100));
            assert_eq!((constants[1].draw_offset, constants[1].draw_commands_count), (100, 70));

            let dispatches: Vec<_> = commands
                .iter()
                .filter(|command| matches!(command, RecordedCommand::Dispatch { .. }))
                .collect();
            assert_eq!(
                dispatches,
                [
                    &RecordedCommand::Dispatch { x: 2, y: 1, z: 1 },
                    &RecordedCommand::Dispatch { x: 2, y: 1, z: 1 }
                ]
            );

            let visibility_barrier = commands
                .iter()
                .rev()
                .find_map(|command| match command {
                    RecordedCommand::PipelineBarrier(dependency) => Some(dependency),
                    _ => None,
                })
                .unwrap();
            assert_eq!(visibility_barrier.buffer_barriers[0].src_access, visibility_access);
        }
    }
}

// ============================================================================
// HZB
// ============================================================================

#[rstest]
fn test_build_hzb_commands(mut scene: TestScene) {
    let recording = record(&mut scene, 1);
    let commands = recording.frames[0].commands_in_label(BUILD_HZB);
    let mips = 11;

    // graph barrier, pipeline, five commands per mip, final transition
    assert_eq!(commands.len(), 2 + mips * 5 + 1);
    assert!(matches!(commands[0], RecordedCommand::PipelineBarrier(_)));
    assert!(matches!(
        &commands[1],
        RecordedCommand::BindPipeline { pipeline, .. } if pipeline == "Main Build HZB"
    ));

    for mip in 0..mips as u32 {
        let base = 2 + mip as usize * 5;
        let size = 2048 >> mip;

        let to_general = &barrier(&commands[base]).image_barriers[0];
        assert_eq!((to_general.base_mip, to_general.mip_count), (mip, 1));
        assert_eq!(to_general.old_layout, ImageLayout::Undefined);
        assert_eq!(to_general.new_layout, ImageLayout::General);

        let RecordedCommand::PushDescriptors { writes, .. } = &commands[base + 1] else {
            panic!("expected push descriptors, got {:?}", commands[base + 1]);
        };
        let (source, source_mip) = if mip == 0 {
            (recording.depth, None)
        } else {
            (recording.hzb, Some(mip - 1))
        };
        assert_eq!(
            writes[0],
            DescriptorWrite::CombinedImageSampler {
                binding: 0,
                image: source,
                mip: source_mip,
                sampler: recording.build_hzb_sampler,
                layout: ImageLayout::ShaderReadOnlyOptimal,
            }
        );
        assert_eq!(
            writes[1],
            DescriptorWrite::StorageImage {
                binding: 1,
                image: recording.hzb,
                mip: Some(mip),
                layout: ImageLayout::General,
            }
        );

        let RecordedCommand::PushConstants { data, .. } = &commands[base + 2] else {
            panic!("expected push constants, got {:?}", commands[base + 2]);
        };
        assert_eq!(data.as_slice(), (size as u32).to_ne_bytes());

        let groups = (size as u32).div_ceil(16);
        assert_eq!(commands[base + 3], RecordedCommand::Dispatch { x: groups, y: groups, z: 1 });

        let to_read = &barrier(&commands[base + 4]).image_barriers[0];
        assert_eq!(to_read.base_mip, mip);
        assert_eq!(to_read.new_layout, ImageLayout::ShaderReadOnlyOptimal);
    }

    let last = &barrier(&commands[commands.len() - 1]).image_barriers[0];
    assert_eq!((last.base_mip, last.mip_count), (0, mips as u32));
    assert_eq!(last.old_layout, ImageLayout::ShaderReadOnlyOptimal);
    assert_eq!(last.new_layout, ImageLayout::General);
}

// ============================================================================
// Geometry
// ============================================================================

#[rstest]
fn test_geometry_prepass_and_second_pass(mut scene: TestScene) {
    scene.populate(5, 0);
    let recording = record(&mut scene, 1);
    let frame = &recording.frames[0];
    let static_draw = recording.static_draw;

    let prepass = frame.commands_in_label(PREPASS_GEOMETRY);
    // graph barrier, viewport, scissor, rendering with one static draw
    assert!(matches!(prepass[0], RecordedCommand::PipelineBarrier(_)));
    assert!(matches!(prepass[1], RecordedCommand::SetViewport(_)));
    assert!(matches!(prepass[2], RecordedCommand::SetScissor(_)));
    let RecordedCommand::BeginRendering(info) = &prepass[3] else {
        panic!("expected begin rendering, got {:?}", prepass[3]);
    };
    assert_eq!(info.area.extent, Extent2D::new(1280, 720));
    assert_eq!(info.color_attachments.len(), 1);
    assert_eq!(info.color_attachments[0].load_op, LoadOp::Clear);
    let depth = info.depth_attachment.unwrap();
    assert_eq!(depth.image, recording.depth);
    assert_eq!(depth.load_op, LoadOp::Clear);

    let draws: Vec<_> = prepass
        .iter()
        .filter(|command| matches!(command, RecordedCommand::DrawIndexedIndirectCount { .. }))
        .collect();
    assert_eq!(
        draws,
        [&RecordedCommand::DrawIndexedIndirectCount {
            buffer: static_draw.draw_buffer,
            offset: 0,
            count_buffer: static_draw.redirect_buffer,
            count_offset: 0,
            max_draw_count: static_draw.capacity,
            stride: 20,
        }]
    );
    assert_eq!(prepass.last(), Some(&RecordedCommand::EndRendering));

    let writes = prepass
        .iter()
        .find_map(|command| match command {
            RecordedCommand::PushDescriptors { writes, .. } => Some(writes),
            _ => None,
        })
        .unwrap();
    assert_eq!(writes.len(), 5);
    assert_eq!(
        writes[4],
        DescriptorWrite::StorageBuffer {
            binding: 4,
            buffer: scene.gpu_scene.material_buffer(0),
        }
    );

    let second = frame.commands_in_label(SECOND_GEOMETRY);
    // visibility barrier, viewport, scissor, then depth back to attachment
    let restore = &barrier(&second[3]).image_barriers[0];
    assert_eq!(restore.image, recording.depth);
    assert_eq!(restore.old_layout, ImageLayout::ShaderReadOnlyOptimal);
    assert_eq!(restore.new_layout, ImageLayout::DepthStencilAttachmentOptimal);
    let RecordedCommand::BeginRendering(info) = &second[4] else {
        panic!("expected begin rendering, got {:?}", second[4]);
    };
    assert_eq!(info.color_attachments[0].load_op, LoadOp::Load);
    assert_eq!(info.depth_attachment.map(|d| d.load_op), Some(LoadOp::Load));
}

// ============================================================================
// Culling decisions
// ============================================================================

#[rstest]
fn test_two_pass_culling_on_gathered_scene(mut scene: TestScene) {
    let mesh = scene.mesh("Crate", 1);
    let statics = [
        (Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)), mesh),
        (Mat4::from_translation(Vec3::new(-4.0, 0.0, -20.0)), mesh),
        // behind the camera
        (Mat4::from_translation(Vec3::new(0.0, 0.0, 15.0)), mesh),
    ];
    scene
        .gpu_scene
        .set_draws(scene.context.resources(), &statics, &[])
        .unwrap();

    let camera = Camera::new(Vec3::ZERO, -Vec3::Z)
        .with_projection(Projection::perspective(90.0, 16.0 / 9.0, 0.1, 100.0));
    scene
        .camera
        .update(&mut scene.context.resources_mut().buffers, 0, &camera)
        .unwrap();
    let uniform = *scene.camera.uniform();

    // last frame a wall stood right in front of the camera; it is gone now
    let previous = DepthPyramid::build(&vec![0.95; 128 * 72], 128, 72, true).unwrap();
    let current = DepthPyramid::build(&vec![0.0; 128 * 72], 128, 72, true).unwrap();

    let mut culler = TwoPassCuller::new(scene.context.config().max_static_instances);
    let range = scene.gpu_scene.static_draws();
    culler
        .prepass(
            &uniform,
            scene.gpu_scene.instances(),
            scene.gpu_scene.draw_commands(),
            range,
            Some(&previous),
        )
        .unwrap();
    assert!(culler.redirect().is_empty());

    culler
        .second_pass(
            &uniform,
            scene.gpu_scene.instances(),
            scene.gpu_scene.draw_commands(),
            range,
            &current,
        )
        .unwrap();
    assert_eq!(culler.redirect(), &[0, 1]);
    assert_eq!(culler.draws(), &scene.gpu_scene.draw_commands()[..2]);
    assert!(!culler.is_visible(2));
}
