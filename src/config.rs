//! Renderer configuration and capacity constants.

use crate::backend::Extent2D;
use crate::error::{RendererError, RendererResult};

/// Capacity of the scene's instance and draw-command buffers.
pub const MAX_INSTANCES: u32 = 2048;
/// Capacity of a camera batch's static draw list.
pub const MAX_STATIC_INSTANCES: u32 = 2048;
/// Capacity of a camera batch's skinned draw list.
pub const MAX_SKINNED_INSTANCES: u32 = 512;
/// Capacity of the scene's material buffer.
pub const MAX_MATERIALS: u32 = 1024;
/// Number of frames recorded ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Configuration for a [`GraphicsContext`](crate::GraphicsContext).
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Capacity of the scene's per-frame instance and draw-command buffers
    pub max_instances: u32,
    /// Static draw capacity per camera batch (multiple of 8)
    pub max_static_instances: u32,
    /// Skinned draw capacity per camera batch (multiple of 8)
    pub max_skinned_instances: u32,
    /// Material slots uploaded with the scene
    pub max_materials: u32,
    /// Number of per-frame buffer slots
    pub frames_in_flight: u32,
    /// Depth is cleared to 0 and closer fragments have larger depth
    pub reverse_z: bool,
    /// Viewport of graphics nodes that declare no attachment
    pub swapchain_extent: Extent2D,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_instances: MAX_INSTANCES,
            max_static_instances: MAX_STATIC_INSTANCES,
            max_skinned_instances: MAX_SKINNED_INSTANCES,
            max_materials: MAX_MATERIALS,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            reverse_z: true,
            swapchain_extent: Extent2D::new(1280, 720),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> RendererResult<()> {
        for (name, value) in [
            ("max_instances", self.max_instances),
            ("max_materials", self.max_materials),
        ] {
            if value == 0 {
                return Err(RendererError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        for (name, value) in [
            ("max_static_instances", self.max_static_instances),
            ("max_skinned_instances", self.max_skinned_instances),
        ] {
            // visibility bitsets hold one bit per draw
            if value == 0 || value % 8 != 0 {
                return Err(RendererError::InvalidConfig(format!(
                    "{name} must be a non-zero multiple of 8, got {value}"
                )));
            }
        }
        if self.frames_in_flight == 0 {
            return Err(RendererError::InvalidConfig(
                "frames_in_flight must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Buffer slot used by `current_frame`.
    pub fn frame_slot(&self, current_frame: u32) -> usize {
        (current_frame % self.frames_in_flight) as usize
    }

    /// Depth value the depth buffer is cleared to.
    pub fn clear_depth(&self) -> f32 {
        if self.reverse_z {
            0.0
        } else {
            1.0
        }
    }
}
