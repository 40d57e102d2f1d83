//! Transform and mesh renderer components

use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3};

use crate::resources::MeshHandle;

/// Transform component for positioning objects in 3D space
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Largest absolute scale factor, used to scale bounding spheres
    pub fn max_scale(&self) -> f32 {
        self.scale.abs().max_element()
    }

    /// Get forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Translate by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }
}

/// Draws a mesh through the static geometry batch.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMeshRenderer {
    pub mesh: MeshHandle,
}

/// Draws a mesh through the skinned geometry batch.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinnedMeshRenderer {
    pub mesh: MeshHandle,
}
