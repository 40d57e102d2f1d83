//! GPU buffers with optional host access.

use std::ops::{Deref, DerefMut};

use bytemuck::Pod;

use crate::backend::{Backend, BackendError, BackendResult, BufferUsage, GpuBuffer, MemoryUsage};
use crate::error::RendererResult;

use super::handle::ResourceHandle;
use super::manager::ResourceManager;

pub type BufferHandle = ResourceHandle<Buffer>;

/// Parameters for creating a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferCreation {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
    pub mappable: bool,
    pub name: String,
}

impl BufferCreation {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            usage: BufferUsage::STORAGE,
            memory: MemoryUsage::GpuOnly,
            mappable: false,
            name: String::new(),
        }
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Host-visible memory kinds make the buffer mappable.
    pub fn with_memory(mut self, memory: MemoryUsage) -> Self {
        self.memory = memory;
        self.mappable = memory != MemoryUsage::GpuOnly;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A GPU buffer owned by a [`BufferResourceManager`].
#[derive(Debug)]
pub struct Buffer {
    pub name: String,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
    pub mappable: bool,
    gpu: GpuBuffer,
}

impl Buffer {
    pub fn new(backend: &Backend, creation: &BufferCreation) -> RendererResult<Self> {
        if creation.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "buffer '{}' has zero size",
                creation.name
            ))
            .into());
        }

        let gpu = backend.create_buffer(creation)?;
        Ok(Self {
            name: creation.name.clone(),
            size: creation.size,
            usage: creation.usage,
            memory: creation.memory,
            mappable: creation.mappable,
            gpu,
        })
    }

    fn check_range(&self, offset: u64, len: u64) -> BackendResult<()> {
        if !self.mappable {
            return Err(BackendError::NotMappable(self.name.clone()));
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(BackendError::OutOfBounds {
                name: self.name.clone(),
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Copy `data` into the buffer at `offset`.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> BackendResult<()> {
        self.check_range(offset, data.len() as u64)?;
        let name = &self.name;
        let mapped = self
            .gpu
            .mapped_mut()
            .ok_or_else(|| BackendError::NotMappable(name.clone()))?;
        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn write_pod<T: Pod>(&mut self, offset: u64, values: &[T]) -> BackendResult<()> {
        self.write(offset, bytemuck::cast_slice(values))
    }

    pub fn read(&self, offset: u64, len: u64) -> BackendResult<Vec<u8>> {
        self.check_range(offset, len)?;
        let mapped = self
            .gpu
            .mapped()
            .ok_or_else(|| BackendError::NotMappable(self.name.clone()))?;
        let start = offset as usize;
        Ok(mapped[start..start + len as usize].to_vec())
    }

    /// Read `count` values of `T` starting at `offset`.
    pub fn read_pod<T: Pod>(&self, offset: u64, count: usize) -> BackendResult<Vec<T>> {
        let bytes = self.read(offset, (count * std::mem::size_of::<T>()) as u64)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn gpu(&self) -> &GpuBuffer {
        &self.gpu
    }
}

/// Pool of [`Buffer`]s.
#[derive(Debug, Default)]
pub struct BufferResourceManager {
    pool: ResourceManager<Buffer>,
}

impl BufferResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, backend: &Backend, creation: &BufferCreation) -> RendererResult<BufferHandle> {
        let buffer = Buffer::new(backend, creation)?;
        Ok(self.pool.create(buffer))
    }
}

impl Deref for BufferResourceManager {
    type Target = ResourceManager<Buffer>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl DerefMut for BufferResourceManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pool
    }
}
