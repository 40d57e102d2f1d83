//! Camera system

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::backend::{Backend, BufferUsage, MemoryUsage};
use crate::config::RendererConfig;
use crate::error::RendererResult;
use crate::resources::{BufferCreation, BufferHandle, BufferResourceManager};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        half_size: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(half_size: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            half_size,
            near,
            far,
        }
    }

    /// Projection to Vulkan clip space. With `reverse_z` the near plane maps
    /// to depth 1 and the far plane to depth 0.
    pub fn matrix(&self, reverse_z: bool) -> Mat4 {
        let (near, far) = if reverse_z {
            (self.far(), self.near())
        } else {
            (self.near(), self.far())
        };
        match *self {
            Projection::Perspective { fov_y, aspect, .. } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { half_size, .. } => Mat4::orthographic_rh(
                -half_size, half_size, -half_size, half_size, near, far,
            ),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => *far,
        }
    }

    pub fn is_perspective(&self) -> bool {
        matches!(self, Projection::Perspective { .. })
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub reverse_z: bool,
    pub culling_enabled: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
            reverse_z: true,
            culling_enabled: true,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_reverse_z(mut self, reverse_z: bool) -> Self {
        self.reverse_z = reverse_z;
        self
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix(self.reverse_z)
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height);
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniform {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        let view_projection = projection * view;

        CameraUniform {
            view,
            projection,
            view_projection,
            frustum_planes: frustum_planes(view_projection),
            position: self.position.extend(1.0),
            near: self.projection.near(),
            far: self.projection.far(),
            culling_enabled: self.culling_enabled as u32,
            flags: (self.reverse_z as u32) | ((self.projection.is_perspective() as u32) << 1),
        }
    }
}

/// Gribb-Hartmann frustum planes of a Vulkan (`[0, 1]` depth) clip space.
///
/// Order: left, right, bottom, top, depth 0, depth 1. Plane normals point
/// inwards and are normalized, so `plane.xyz · p + plane.w` is a signed
/// distance.
pub fn frustum_planes(view_projection: Mat4) -> [Vec4; 6] {
    let rows = view_projection.transpose();
    let (x, y, z, w) = (rows.x_axis, rows.y_axis, rows.z_axis, rows.w_axis);

    [w + x, w - x, w + y, w - y, z, w - z].map(|plane| {
        let length = plane.truncate().length();
        if length > 0.0 {
            plane / length
        } else {
            plane
        }
    })
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub frustum_planes: [Vec4; 6],
    pub position: Vec4,
    pub near: f32,
    pub far: f32,
    pub culling_enabled: u32,
    /// Bit 0: reverse-Z, bit 1: perspective projection
    pub flags: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<CameraUniform>(), 320);

impl CameraUniform {
    pub fn reverse_z(&self) -> bool {
        self.flags & 1 != 0
    }

    pub fn is_perspective(&self) -> bool {
        self.flags & 2 != 0
    }
}

/// Per-frame uniform buffers holding a [`CameraUniform`].
#[derive(Debug)]
pub struct CameraResource {
    buffers: Vec<BufferHandle>,
    uniform: CameraUniform,
}

impl CameraResource {
    pub fn new(
        backend: &Backend,
        buffers: &mut BufferResourceManager,
        config: &RendererConfig,
    ) -> RendererResult<Self> {
        let handles = (0..config.frames_in_flight)
            .map(|frame| {
                buffers.create(
                    backend,
                    &BufferCreation::new(std::mem::size_of::<CameraUniform>() as u64)
                        .with_usage(BufferUsage::UNIFORM)
                        .with_memory(MemoryUsage::CpuToGpu)
                        .with_name(format!("[{frame}] Camera Buffer")),
                )
            })
            .collect::<RendererResult<Vec<_>>>()?;

        Ok(Self {
            buffers: handles,
            uniform: CameraUniform::zeroed(),
        })
    }

    /// Upload `camera` into the buffer of `current_frame`.
    pub fn update(
        &mut self,
        buffers: &mut BufferResourceManager,
        current_frame: u32,
        camera: &Camera,
    ) -> RendererResult<()> {
        self.uniform = camera.uniform_data();
        let handle = self.buffer(current_frame);
        buffers
            .access_mut(handle)
            .write(0, bytemuck::bytes_of(&self.uniform))?;
        Ok(())
    }

    /// Buffer used by `current_frame`.
    pub fn buffer(&self, current_frame: u32) -> BufferHandle {
        self.buffers[current_frame as usize % self.buffers.len()]
    }

    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    /// Data of the last update.
    pub fn uniform(&self) -> &CameraUniform {
        &self.uniform
    }

    pub fn destroy(self, buffers: &mut BufferResourceManager) {
        for handle in self.buffers {
            buffers.destroy(handle);
        }
    }
}
