//! Common utilities for the integration tests.
//!
//! Everything runs on the dummy backend: resources keep CPU shadows and
//! command lists record every call, so tests inspect what would have been
//! submitted to the GPU.

#![allow(dead_code)]

use glam::Mat4;
use rstest::fixture;

use redlilium_renderer::backend::{
    Backend, BufferUsage, CommandRecorder, Format, ImageUsage, MemoryUsage,
};
use redlilium_renderer::frame_graph::FrameGraphRenderPass;
use redlilium_renderer::pipeline::SPIRV_MAGIC;
use redlilium_renderer::resources::{
    BatchBuffer, BufferCreation, BufferHandle, ImageCreation, ImageHandle, MaterialCreation,
    MeshCreation, MeshHandle, MeshPrimitive,
};
use redlilium_renderer::scene::{CameraResource, DirectionalLight, RenderSceneDescription};
use redlilium_renderer::{GpuScene, GraphicsContext, RendererConfig};

/// Smallest module header accepted by pipeline creation.
pub const TEST_SPIRV: [u32; 5] = [SPIRV_MAGIC, 0x0001_0300, 0, 1, 0];

pub fn test_spirv() -> Vec<u32> {
    TEST_SPIRV.to_vec()
}

/// Route `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Passes
// ============================================================================

/// Pass recording nothing; the graph's own commands are all that is emitted.
pub struct NoopPass;

impl FrameGraphRenderPass for NoopPass {
    fn record_commands(
        &self,
        _cmd: &mut dyn CommandRecorder,
        _current_frame: u32,
        _scene: &RenderSceneDescription<'_>,
    ) {
    }
}

/// Pass recording a one-group dispatch, so its commands are visible between
/// the graph's barriers and the closing label.
pub struct DispatchPass;

impl FrameGraphRenderPass for DispatchPass {
    fn record_commands(
        &self,
        cmd: &mut dyn CommandRecorder,
        _current_frame: u32,
        _scene: &RenderSceneDescription<'_>,
    ) {
        cmd.dispatch(1, 1, 1);
    }
}

// ============================================================================
// Scene
// ============================================================================

/// A graphics context on the dummy backend with an empty scene and camera.
pub struct TestScene {
    pub context: GraphicsContext,
    pub gpu_scene: GpuScene,
    pub camera: CameraResource,
    pub light: DirectionalLight,
}

impl TestScene {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        init_logging();
        let mut context = GraphicsContext::new(Backend::dummy(), config.clone()).unwrap();
        let (backend, resources) = context.split_mut();
        let gpu_scene = GpuScene::new(backend, &mut resources.buffers, &config).unwrap();
        let camera = CameraResource::new(backend, &mut resources.buffers, &config).unwrap();

        Self {
            context,
            gpu_scene,
            camera,
            light: DirectionalLight::default(),
        }
    }

    pub fn description(&self) -> RenderSceneDescription<'_> {
        RenderSceneDescription {
            resources: self.context.resources(),
            gpu_scene: &self.gpu_scene,
            camera: &self.camera,
            directional_light: &self.light,
            target_swapchain_index: 0,
        }
    }

    pub fn color_target(&mut self, name: &str, width: u32, height: u32) -> ImageHandle {
        self.context
            .create_image(
                &ImageCreation::new()
                    .with_size(width, height)
                    .with_format(Format::Rgba16Sfloat)
                    .with_usage(ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED)
                    .with_name(name),
            )
            .unwrap()
    }

    pub fn depth_target(&mut self, name: &str, width: u32, height: u32) -> ImageHandle {
        self.context
            .create_image(
                &ImageCreation::new()
                    .with_size(width, height)
                    .with_format(Format::D32Sfloat)
                    .with_usage(ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::SAMPLED)
                    .with_name(name),
            )
            .unwrap()
    }

    pub fn storage_buffer(&mut self, name: &str) -> BufferHandle {
        self.context
            .create_buffer(
                &BufferCreation::new(256)
                    .with_usage(BufferUsage::STORAGE)
                    .with_memory(MemoryUsage::GpuOnly)
                    .with_name(name),
            )
            .unwrap()
    }

    pub fn batch_buffer(&mut self, name: &str) -> BatchBuffer {
        let (backend, resources) = self.context.split_mut();
        BatchBuffer::new(backend, &mut resources.buffers, name, 32, 1024, 4096).unwrap()
    }

    /// A mesh of `primitives` unit-radius primitives sharing one material.
    pub fn mesh(&mut self, name: &str, primitives: u32) -> MeshHandle {
        let resources = self.context.resources_mut();
        let material = resources
            .materials
            .create(&resources.images, &MaterialCreation::default())
            .unwrap();
        let primitives = (0..primitives)
            .map(|i| MeshPrimitive {
                index_count: 36,
                first_index: i * 36,
                vertex_offset: 0,
                material,
                bounding_radius: 1.0,
            })
            .collect();
        resources
            .meshes
            .create(
                &resources.materials,
                MeshCreation {
                    name: name.to_string(),
                    primitives,
                },
            )
            .unwrap()
    }

    /// Fill the scene with `static_count` static and `skinned_count` skinned
    /// single-primitive meshes at the origin.
    pub fn populate(&mut self, static_count: usize, skinned_count: usize) {
        let mesh = self.mesh("Cube", 1);
        let statics = vec![(Mat4::IDENTITY, mesh); static_count];
        let skinned = vec![(Mat4::IDENTITY, mesh); skinned_count];
        self.gpu_scene
            .set_draws(self.context.resources(), &statics, &skinned)
            .unwrap();
    }
}

impl Default for TestScene {
    fn default() -> Self {
        Self::new()
    }
}

#[fixture]
pub fn scene() -> TestScene {
    TestScene::new()
}
