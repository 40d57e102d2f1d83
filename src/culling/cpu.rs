//! CPU reference of the culling kernels.
//!
//! [`DepthPyramid`] is built the way [`BuildHzbPass`](super::BuildHzbPass)
//! builds the HZB and [`TwoPassCuller`] makes the decisions the culling
//! shader makes, so the two-pass scheme can be checked without a GPU.

use glam::{Vec3, Vec4Swizzles};

use crate::error::{RendererError, RendererResult};
use crate::gpu_scene::{DrawIndexedIndirectCommand, DrawRange, InstanceData};
use crate::scene::CameraUniform;

use super::frustum::{nearest_depth, project_sphere, sphere_in_frustum};
use super::hzb::{hzb_mip_count, hzb_size};

/// Square mip chain keeping the farthest depth of every footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthPyramid {
    size: u32,
    reverse_z: bool,
    mips: Vec<Vec<f32>>,
}

impl DepthPyramid {
    /// Reduce a row-major `width` x `height` depth buffer.
    pub fn build(depth: &[f32], width: u32, height: u32, reverse_z: bool) -> RendererResult<Self> {
        if width == 0 || height == 0 || depth.len() != width as usize * height as usize {
            return Err(RendererError::InvalidConfig(format!(
                "depth buffer holds {} values, expected {width}x{height}",
                depth.len()
            )));
        }

        let size = hzb_size(width, height);
        let mip_count = hzb_mip_count(size);
        let mut pyramid = Self {
            size,
            reverse_z,
            mips: Vec::with_capacity(mip_count as usize),
        };

        // texel range of the source covered by texel `i` of an edge of `size`
        let footprint = |i: u32, source: u32| {
            let begin = (i as u64 * source as u64 / size as u64) as u32;
            let end = ((i as u64 + 1) * source as u64).div_ceil(size as u64) as u32;
            (begin.min(source - 1), end.clamp(begin + 1, source))
        };

        let mut top = Vec::with_capacity(size as usize * size as usize);
        for y in 0..size {
            let (y0, y1) = footprint(y, height);
            for x in 0..size {
                let (x0, x1) = footprint(x, width);
                let value = (y0..y1)
                    .flat_map(|sy| (x0..x1).map(move |sx| depth[(sy * width + sx) as usize]))
                    .fold(pyramid.identity(), |a, b| pyramid.farthest(a, b));
                top.push(value);
            }
        }
        pyramid.mips.push(top);

        for mip in 1..mip_count {
            let previous = &pyramid.mips[mip as usize - 1];
            let previous_size = (size >> (mip - 1)).max(1);
            let mip_size = (size >> mip).max(1);
            let mut level = Vec::with_capacity(mip_size as usize * mip_size as usize);
            for y in 0..mip_size {
                for x in 0..mip_size {
                    let mut value = pyramid.identity();
                    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                        let sx = (x * 2 + dx).min(previous_size - 1);
                        let sy = (y * 2 + dy).min(previous_size - 1);
                        value = pyramid.farthest(value, previous[(sy * previous_size + sx) as usize]);
                    }
                    level.push(value);
                }
            }
            pyramid.mips.push(level);
        }

        Ok(pyramid)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn reverse_z(&self) -> bool {
        self.reverse_z
    }

    /// Depth stored at texel `(x, y)` of `mip`.
    pub fn texel(&self, mip: u32, x: u32, y: u32) -> f32 {
        let mip_size = (self.size >> mip).max(1);
        self.mips[mip as usize][(y * mip_size + x) as usize]
    }

    fn farthest(&self, a: f32, b: f32) -> f32 {
        if self.reverse_z {
            a.min(b)
        } else {
            a.max(b)
        }
    }

    fn identity(&self) -> f32 {
        if self.reverse_z {
            f32::INFINITY
        } else {
            f32::NEG_INFINITY
        }
    }

    /// Whether a view-space sphere lies entirely behind the recorded depth.
    ///
    /// Only perspective cameras are tested; spheres crossing the near plane
    /// are never occluded.
    pub fn is_occluded(&self, camera: &CameraUniform, center: Vec3, radius: f32) -> bool {
        if !camera.is_perspective() {
            return false;
        }
        let Some(bounds) = project_sphere(center, radius, camera.near, &camera.projection) else {
            return false;
        };

        let extent = (bounds.zw() - bounds.xy()) * self.size as f32;
        let level = extent.max_element().max(1.0).log2().floor() as u32;
        let level = level.min(self.mip_count() - 1);

        let mip_size = (self.size >> level).max(1);
        let texel = |uv: f32| ((uv.clamp(0.0, 1.0) * mip_size as f32) as u32).min(mip_size - 1);
        let (x0, x1) = (texel(bounds.x), texel(bounds.z));
        let (y0, y1) = (texel(bounds.y), texel(bounds.w));

        let mut occluder = self.identity();
        for y in y0..=y1 {
            for x in x0..=x1 {
                occluder = self.farthest(occluder, self.texel(level, x, y));
            }
        }

        let nearest = nearest_depth(center, radius, &camera.projection);
        if self.reverse_z {
            nearest <= occluder
        } else {
            nearest >= occluder
        }
    }
}

/// Two-pass culling of one draw batch.
///
/// Mirrors the GPU buffers: a visibility bitset over the batch's draws, the
/// redirect list of scene instance indices and the compacted draw commands.
#[derive(Debug, Clone)]
pub struct TwoPassCuller {
    capacity: u32,
    visibility: Vec<u8>,
    redirect: Vec<u32>,
    draws: Vec<DrawIndexedIndirectCommand>,
}

impl TwoPassCuller {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            visibility: vec![0; capacity.div_ceil(8) as usize],
            redirect: Vec::with_capacity(capacity as usize),
            draws: Vec::with_capacity(capacity as usize),
        }
    }

    /// Cull `range` against the previous frame's depth. Without a pyramid
    /// only the frustum test applies.
    pub fn prepass(
        &mut self,
        camera: &CameraUniform,
        instances: &[InstanceData],
        draw_commands: &[DrawIndexedIndirectCommand],
        range: DrawRange,
        previous: Option<&DepthPyramid>,
    ) -> RendererResult<()> {
        self.check_capacity(range)?;
        self.visibility.fill(0);
        self.redirect.clear();
        self.draws.clear();

        for local in 0..range.count {
            if self.test(camera, instances, range.offset + local, previous) {
                self.append(local, range, draw_commands);
            }
        }
        Ok(())
    }

    /// Cull the draws the prepass rejected against this frame's depth.
    pub fn second_pass(
        &mut self,
        camera: &CameraUniform,
        instances: &[InstanceData],
        draw_commands: &[DrawIndexedIndirectCommand],
        range: DrawRange,
        hzb: &DepthPyramid,
    ) -> RendererResult<()> {
        self.check_capacity(range)?;
        self.redirect.clear();
        self.draws.clear();

        for local in 0..range.count {
            if self.is_visible(local) {
                continue;
            }
            if self.test(camera, instances, range.offset + local, Some(hzb)) {
                self.append(local, range, draw_commands);
            }
        }
        Ok(())
    }

    /// Scene instance indices of the compacted draws.
    pub fn redirect(&self) -> &[u32] {
        &self.redirect
    }

    /// Value the GPU writes to the first word of the redirect buffer.
    pub fn redirect_count(&self) -> u32 {
        self.redirect.len() as u32
    }

    pub fn draws(&self) -> &[DrawIndexedIndirectCommand] {
        &self.draws
    }

    /// Whether draw `local` of the batch passed either pass this frame.
    pub fn is_visible(&self, local: u32) -> bool {
        self.visibility
            .get(local as usize / 8)
            .is_some_and(|byte| byte & (1 << (local % 8)) != 0)
    }

    fn check_capacity(&self, range: DrawRange) -> RendererResult<()> {
        if range.count > self.capacity {
            return Err(RendererError::CapacityExceeded {
                what: "culled draws",
                capacity: self.capacity as usize,
                requested: range.count as usize,
            });
        }
        Ok(())
    }

    fn test(
        &self,
        camera: &CameraUniform,
        instances: &[InstanceData],
        index: u32,
        hzb: Option<&DepthPyramid>,
    ) -> bool {
        if camera.culling_enabled == 0 {
            return true;
        }
        let Some(instance) = instances.get(index as usize) else {
            return false;
        };

        let (center, radius) = instance.world_sphere();
        if !sphere_in_frustum(&camera.frustum_planes, center, radius) {
            return false;
        }

        let view_center = camera.view.transform_point3(center);
        !hzb.is_some_and(|hzb| hzb.is_occluded(camera, view_center, radius))
    }

    fn append(&mut self, local: u32, range: DrawRange, draw_commands: &[DrawIndexedIndirectCommand]) {
        let index = range.offset + local;
        self.redirect.push(index);
        self.draws
            .push(draw_commands.get(index as usize).copied().unwrap_or_default());
        self.visibility[local as usize / 8] |= 1 << (local % 8);
    }
}
