//! Bounding sphere tests shared by the culling kernels

use glam::{Mat4, Vec3, Vec4};

/// Whether a world-space sphere intersects the frustum described by inward
/// facing, normalized planes.
pub fn sphere_in_frustum(planes: &[Vec4; 6], center: Vec3, radius: f32) -> bool {
    planes
        .iter()
        .all(|plane| plane.truncate().dot(center) + plane.w > -radius)
}

/// Screen-space bounds of a view-space sphere as `(min_u, min_v, max_u, max_v)`
/// in `[0, 1]` framebuffer coordinates.
///
/// `projection` must be a perspective projection. Returns `None` when the
/// sphere crosses the near plane, where the bounds are unbounded.
pub fn project_sphere(center: Vec3, radius: f32, near: f32, projection: &Mat4) -> Option<Vec4> {
    // distance in front of the camera, view space looks down -Z
    let depth = -center.z;
    if depth < radius + near {
        return None;
    }

    let p00 = projection.x_axis.x;
    let p11 = projection.y_axis.y;
    let depth_radius_sq = depth * depth - radius * radius;

    let vx = (center.x * center.x + depth_radius_sq).sqrt();
    let min_x = (vx * center.x - radius * depth) / (vx * depth + radius * center.x);
    let max_x = (vx * center.x + radius * depth) / (vx * depth - radius * center.x);

    let vy = (center.y * center.y + depth_radius_sq).sqrt();
    let min_y = (vy * center.y - radius * depth) / (vy * depth + radius * center.y);
    let max_y = (vy * center.y + radius * depth) / (vy * depth - radius * center.y);

    let ndc = Vec4::new(min_x * p00, min_y * p11, max_x * p00, max_y * p11);
    Some(ndc * 0.5 + Vec4::splat(0.5))
}

/// Depth-buffer value of the sphere point closest to the camera.
pub fn nearest_depth(center: Vec3, radius: f32, projection: &Mat4) -> f32 {
    let nearest = Vec4::new(0.0, 0.0, center.z + radius, 1.0);
    let clip = *projection * nearest;
    clip.z / clip.w
}
