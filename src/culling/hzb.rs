//! Hierarchical Z-buffer sizing

use crate::backend::{BorderColor, ReductionMode};

/// Work group edge of the HZB downsample shader.
pub const HZB_LOCAL_SIZE: u32 = 16;

/// Edge of the square HZB covering a `width` x `height` depth buffer.
pub fn hzb_size(width: u32, height: u32) -> u32 {
    width.max(height).max(1).next_power_of_two()
}

/// Number of HZB mips: one per halving of `size`, at least one.
pub fn hzb_mip_count(size: u32) -> u32 {
    size.max(1).ilog2().max(1)
}

/// Reduction keeping the farthest depth of a footprint.
pub fn hzb_reduction(reverse_z: bool) -> ReductionMode {
    if reverse_z {
        ReductionMode::Min
    } else {
        ReductionMode::Max
    }
}

/// Border value reading as the farthest depth, so footprints leaving the
/// screen never count as occluded.
pub fn hzb_border_color(reverse_z: bool) -> BorderColor {
    if reverse_z {
        BorderColor::FloatOpaqueBlack
    } else {
        BorderColor::FloatOpaqueWhite
    }
}

/// Work groups needed to cover `size` invocations.
pub fn group_count(size: u32, local_size: u32) -> u32 {
    size.div_ceil(local_size)
}
