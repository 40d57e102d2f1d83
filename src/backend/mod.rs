//! GPU backend abstraction layer.
//!
//! The renderer core only depends on the types in this module. GPU objects
//! are enums with one variant per backend, so resource managers can own them
//! without generics and releasing one is just dropping it.
//!
//! # Available Backends
//!
//! - `dummy`: no GPU work, buffers keep a CPU shadow copy and command lists
//!   record every call for inspection
//! - `vulkan-backend`: native Vulkan through ash and gpu-allocator

pub mod command;
pub mod dummy;
mod error;
pub mod types;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub use command::*;
pub use dummy::{CommandList, DummyBackend, RecordedCommand};
pub use error::*;
pub use types::*;

#[cfg(feature = "vulkan-backend")]
use std::sync::Arc;

#[cfg(feature = "vulkan-backend")]
use ash::vk;
#[cfg(feature = "vulkan-backend")]
use gpu_allocator::vulkan::{Allocation, Allocator};
#[cfg(feature = "vulkan-backend")]
use parking_lot::Mutex;

use crate::pipeline::PipelineDescriptor;
use crate::resources::{BufferCreation, ImageCreation, SamplerCreation};

#[cfg(feature = "vulkan-backend")]
pub use vulkan::{VulkanBackend, VulkanCommandRecorder};

/// Backend used to create GPU objects.
pub enum Backend {
    Dummy(DummyBackend),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(VulkanBackend),
}

impl Backend {
    pub fn dummy() -> Self {
        Self::Dummy(DummyBackend::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dummy(backend) => backend.name(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.name(),
        }
    }

    pub fn create_image(&self, creation: &ImageCreation) -> BackendResult<GpuImage> {
        match self {
            Self::Dummy(backend) => backend.create_image(creation),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.create_image(creation),
        }
    }

    pub fn create_buffer(&self, creation: &BufferCreation) -> BackendResult<GpuBuffer> {
        match self {
            Self::Dummy(backend) => backend.create_buffer(creation),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.create_buffer(creation),
        }
    }

    pub fn create_sampler(&self, creation: &SamplerCreation) -> BackendResult<GpuSampler> {
        match self {
            Self::Dummy(backend) => backend.create_sampler(creation),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.create_sampler(creation),
        }
    }

    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        push_descriptor: bool,
    ) -> BackendResult<GpuDescriptorSetLayout> {
        match self {
            Self::Dummy(backend) => backend.create_descriptor_set_layout(bindings, push_descriptor),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.create_descriptor_set_layout(bindings, push_descriptor),
        }
    }

    pub fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_>) -> BackendResult<GpuPipeline> {
        match self {
            Self::Dummy(backend) => backend.create_pipeline(descriptor),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(backend) => backend.create_pipeline(descriptor),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Backend").field(&self.name()).finish()
    }
}

/// View of an image, either the full resource or a single layer/mip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuImageView {
    /// `None` covers every layer or mip.
    Dummy { layer: Option<u32>, mip: Option<u32> },
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::ImageView),
}

/// GPU image together with the views created for it.
#[allow(clippy::large_enum_variant)]
pub enum GpuImage {
    Dummy {
        layers: u32,
        mips: u32,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        image: vk::Image,
        view: vk::ImageView,
        /// Indexed as `mip_views[layer][mip]`.
        mip_views: Vec<Vec<vk::ImageView>>,
        allocation: Option<Allocation>,
    },
}

impl GpuImage {
    pub fn view(&self) -> GpuImageView {
        match self {
            Self::Dummy { .. } => GpuImageView::Dummy {
                layer: None,
                mip: None,
            },
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { view, .. } => GpuImageView::Vulkan(*view),
        }
    }

    pub fn mip_view(&self, layer: u32, mip: u32) -> Option<GpuImageView> {
        match self {
            Self::Dummy { layers, mips } => (layer < *layers && mip < *mips).then_some(
                GpuImageView::Dummy {
                    layer: Some(layer),
                    mip: Some(mip),
                },
            ),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { mip_views, .. } => mip_views
                .get(layer as usize)
                .and_then(|mips| mips.get(mip as usize))
                .map(|view| GpuImageView::Vulkan(*view)),
        }
    }
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { layers, mips } => f
                .debug_struct("GpuImage::Dummy")
                .field("layers", layers)
                .field("mips", mips)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { image, view, .. } => f
                .debug_struct("GpuImage::Vulkan")
                .field("image", image)
                .field("view", view)
                .finish_non_exhaustive(),
        }
    }
}

/// GPU buffer.
///
/// The dummy variant keeps a CPU shadow copy so uploads and readbacks can be
/// observed without a device.
#[allow(clippy::large_enum_variant)]
pub enum GpuBuffer {
    Dummy {
        shadow: Vec<u8>,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        buffer: vk::Buffer,
        allocation: Option<Allocation>,
        size: u64,
    },
}

impl GpuBuffer {
    /// Host-visible bytes of the buffer, if the memory is mapped.
    pub fn mapped(&self) -> Option<&[u8]> {
        match self {
            Self::Dummy { shadow } => Some(shadow),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { allocation, .. } => allocation.as_ref().and_then(|a| a.mapped_slice()),
        }
    }

    pub fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Dummy { shadow } => Some(shadow),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { allocation, .. } => {
                allocation.as_mut().and_then(|a| a.mapped_slice_mut())
            }
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { shadow } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("size", &shadow.len())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, size, .. } => f
                .debug_struct("GpuBuffer::Vulkan")
                .field("buffer", buffer)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

pub enum GpuSampler {
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        sampler: vk::Sampler,
    },
}

impl std::fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuSampler::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { sampler, .. } => f
                .debug_struct("GpuSampler::Vulkan")
                .field("sampler", sampler)
                .finish_non_exhaustive(),
        }
    }
}

pub enum GpuDescriptorSetLayout {
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        layout: vk::DescriptorSetLayout,
    },
}

impl std::fmt::Debug for GpuDescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuDescriptorSetLayout::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { layout, .. } => f
                .debug_struct("GpuDescriptorSetLayout::Vulkan")
                .field("layout", layout)
                .finish_non_exhaustive(),
        }
    }
}

pub enum GpuPipeline {
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
    },
}

impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuPipeline::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                pipeline, layout, ..
            } => f
                .debug_struct("GpuPipeline::Vulkan")
                .field("pipeline", pipeline)
                .field("layout", layout)
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Vulkan Resource Cleanup (Drop implementations)
// ============================================================================

#[cfg(feature = "vulkan-backend")]
fn free_allocation(allocator: &Mutex<Allocator>, allocation: Option<Allocation>, what: &str) {
    if let Some(allocation) = allocation {
        if let Err(e) = allocator.lock().free(allocation) {
            log::error!("Failed to free {} allocation: {}", what, e);
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuImage {
    fn drop(&mut self) {
        if let GpuImage::Vulkan {
            device,
            allocator,
            image,
            view,
            mip_views,
            allocation,
        } = self
        {
            unsafe {
                for layer in mip_views.iter() {
                    for mip_view in layer {
                        device.destroy_image_view(*mip_view, None);
                    }
                }
                device.destroy_image_view(*view, None);
                device.destroy_image(*image, None);
            }
            free_allocation(allocator, allocation.take(), "image");
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let GpuBuffer::Vulkan {
            device,
            allocator,
            buffer,
            allocation,
            ..
        } = self
        {
            unsafe {
                device.destroy_buffer(*buffer, None);
            }
            free_allocation(allocator, allocation.take(), "buffer");
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuSampler {
    fn drop(&mut self) {
        if let GpuSampler::Vulkan { device, sampler } = self {
            unsafe {
                device.destroy_sampler(*sampler, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuDescriptorSetLayout {
    fn drop(&mut self) {
        if let GpuDescriptorSetLayout::Vulkan { device, layout } = self {
            unsafe {
                device.destroy_descriptor_set_layout(*layout, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuPipeline {
    fn drop(&mut self) {
        if let GpuPipeline::Vulkan {
            device,
            pipeline,
            layout,
        } = self
        {
            unsafe {
                device.destroy_pipeline(*pipeline, None);
                device.destroy_pipeline_layout(*layout, None);
            }
        }
    }
}
