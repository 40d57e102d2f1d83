//! Pooled GPU resources.
//!
//! Every GPU object is owned by a resource manager and referred to by a
//! generation-checked [`ResourceHandle`]. [`GpuResources`] groups the
//! managers of all resource kinds.

mod buffer;
mod handle;
mod image;
mod manager;
mod material;
mod mesh;
mod sampler;

pub use buffer::*;
pub use handle::*;
pub use image::*;
pub use manager::*;
pub use material::*;
pub use mesh::*;
pub use sampler::*;

static_assertions::assert_impl_all!(ResourceHandle<Image>: Copy, Send, Sync);

/// All resource managers of a graphics context.
#[derive(Debug, Default)]
pub struct GpuResources {
    pub images: ImageResourceManager,
    pub buffers: BufferResourceManager,
    pub samplers: SamplerResourceManager,
    pub materials: MaterialResourceManager,
    pub meshes: MeshResourceManager,
}

impl GpuResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroy everything, meshes and materials first.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.materials.clear();
        self.images.clear();
        self.samplers.clear();
        self.buffers.clear();
    }
}
