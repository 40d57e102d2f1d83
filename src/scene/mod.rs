//! Scene data consumed by render passes

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;

use crate::gpu_scene::GpuScene;
use crate::resources::GpuResources;

/// Read-only snapshot of everything a frame records against.
///
/// Built once per frame after the scene and camera uploads and handed to
/// every pass through the frame graph.
#[derive(Debug, Clone, Copy)]
pub struct RenderSceneDescription<'a> {
    pub resources: &'a GpuResources,
    pub gpu_scene: &'a GpuScene,
    pub camera: &'a CameraResource,
    pub directional_light: &'a DirectionalLight,
    pub target_swapchain_index: u32,
}
