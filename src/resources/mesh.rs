//! Meshes and the shared geometry buffers their primitives live in.

use std::ops::{Deref, DerefMut};

use crate::backend::{Backend, BufferUsage, IndexType, MemoryUsage};
use crate::error::{RendererError, RendererResult};

use super::buffer::{BufferCreation, BufferHandle, BufferResourceManager};
use super::handle::ResourceHandle;
use super::manager::ResourceManager;
use super::material::{MaterialHandle, MaterialResourceManager};

pub type MeshHandle = ResourceHandle<Mesh>;

/// Index range of one primitive inside a [`BatchBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPrimitive {
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub material: MaterialHandle,
    /// Object-space radius of a sphere centered at the origin enclosing the primitive.
    pub bounding_radius: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MeshCreation {
    pub name: String,
    pub primitives: Vec<MeshPrimitive>,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<MeshPrimitive>,
}

impl Mesh {
    /// Radius enclosing every primitive.
    pub fn bounding_radius(&self) -> f32 {
        self.primitives
            .iter()
            .map(|primitive| primitive.bounding_radius)
            .fold(0.0, f32::max)
    }
}

/// Pool of [`Mesh`]es.
#[derive(Debug, Default)]
pub struct MeshResourceManager {
    pool: ResourceManager<Mesh>,
}

impl MeshResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every primitive must reference a live material.
    pub fn create(
        &mut self,
        materials: &MaterialResourceManager,
        creation: MeshCreation,
    ) -> RendererResult<MeshHandle> {
        if creation
            .primitives
            .iter()
            .any(|primitive| !materials.is_valid(primitive.material))
        {
            return Err(RendererError::InvalidHandle { kind: "material" });
        }

        log::trace!(
            "Created mesh {:?} with {} primitives",
            creation.name,
            creation.primitives.len()
        );
        Ok(self.pool.create(Mesh {
            name: creation.name,
            primitives: creation.primitives,
        }))
    }
}

impl Deref for MeshResourceManager {
    type Target = ResourceManager<Mesh>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl DerefMut for MeshResourceManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pool
    }
}

/// Unified vertex and index buffers shared by all meshes of one geometry class.
///
/// Geometry is appended and never removed. Primitives address it through
/// `first_index` and `vertex_offset`, so a single index buffer bind serves
/// every indirect draw of the class.
#[derive(Debug)]
pub struct BatchBuffer {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    vertex_stride: u32,
    vertex_capacity: u32,
    index_capacity: u32,
    vertex_cursor: u32,
    index_cursor: u32,
}

impl BatchBuffer {
    pub fn new(
        backend: &Backend,
        buffers: &mut BufferResourceManager,
        name: &str,
        vertex_stride: u32,
        vertex_capacity: u32,
        index_capacity: u32,
    ) -> RendererResult<Self> {
        let vertex_buffer = buffers.create(
            backend,
            &BufferCreation::new(vertex_stride as u64 * vertex_capacity as u64)
                .with_usage(BufferUsage::VERTEX | BufferUsage::STORAGE | BufferUsage::TRANSFER_DST)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("{name} Vertex Buffer")),
        )?;
        let index_buffer = buffers.create(
            backend,
            &BufferCreation::new(std::mem::size_of::<u32>() as u64 * index_capacity as u64)
                .with_usage(BufferUsage::INDEX | BufferUsage::TRANSFER_DST)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("{name} Index Buffer")),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_stride,
            vertex_capacity,
            index_capacity,
            vertex_cursor: 0,
            index_cursor: 0,
        })
    }

    /// Append one primitive's vertices (`vertex_stride` bytes each) and indices.
    pub fn append_primitive(
        &mut self,
        buffers: &mut BufferResourceManager,
        vertices: &[u8],
        indices: &[u32],
        material: MaterialHandle,
        bounding_radius: f32,
    ) -> RendererResult<MeshPrimitive> {
        let vertex_count = (vertices.len() / self.vertex_stride as usize) as u32;
        let requested_vertices = self.vertex_cursor as usize + vertex_count as usize;
        if requested_vertices > self.vertex_capacity as usize {
            return Err(RendererError::CapacityExceeded {
                what: "batch vertices",
                capacity: self.vertex_capacity as usize,
                requested: requested_vertices,
            });
        }
        let requested_indices = self.index_cursor as usize + indices.len();
        if requested_indices > self.index_capacity as usize {
            return Err(RendererError::CapacityExceeded {
                what: "batch indices",
                capacity: self.index_capacity as usize,
                requested: requested_indices,
            });
        }

        buffers.access_mut(self.vertex_buffer).write(
            self.vertex_cursor as u64 * self.vertex_stride as u64,
            &vertices[..vertex_count as usize * self.vertex_stride as usize],
        )?;
        buffers
            .access_mut(self.index_buffer)
            .write_pod(self.index_cursor as u64 * 4, indices)?;

        let primitive = MeshPrimitive {
            index_count: indices.len() as u32,
            first_index: self.index_cursor,
            vertex_offset: self.vertex_cursor as i32,
            material,
            bounding_radius,
        };
        self.vertex_cursor += vertex_count;
        self.index_cursor += indices.len() as u32;
        Ok(primitive)
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn index_type(&self) -> IndexType {
        IndexType::Uint32
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_cursor
    }

    pub fn index_count(&self) -> u32 {
        self.index_cursor
    }

    /// Release both buffers. The batch must not be used afterwards.
    pub fn destroy(self, buffers: &mut BufferResourceManager) {
        buffers.destroy(self.vertex_buffer);
        buffers.destroy(self.index_buffer);
    }
}
