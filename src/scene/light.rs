//! Light types for the scene

use bevy_ecs::prelude::*;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Directional light component (like the sun)
#[derive(Component, Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
        }
    }

    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> DirectionalLightData {
        DirectionalLightData {
            direction: self.direction.extend(0.0),
            color_intensity: self.color.extend(self.intensity),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightData {
    /// xyz = direction, w = unused
    pub direction: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
}
