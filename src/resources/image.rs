//! Images and their per-layer, per-mip views.

use std::ops::{Deref, DerefMut};

use crate::backend::{
    Backend, BackendError, Extent2D, Format, GpuImage, GpuImageView, ImageAspect, ImageType,
    ImageUsage,
};
use crate::error::RendererResult;

use super::handle::ResourceHandle;
use super::manager::ResourceManager;
use super::sampler::SamplerHandle;

pub type ImageHandle = ResourceHandle<Image>;

/// Number of mips in a full chain down to 1x1 for the given extent.
pub fn max_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Parameters for creating an [`Image`].
#[derive(Debug, Clone)]
pub struct ImageCreation {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layers: u32,
    pub mips: u32,
    pub usage: ImageUsage,
    pub format: Format,
    pub image_type: ImageType,
    pub sampler: Option<SamplerHandle>,
    pub initial_data: Option<Vec<u8>>,
    pub name: String,
}

impl Default for ImageCreation {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            layers: 1,
            mips: 1,
            usage: ImageUsage::SAMPLED,
            format: Format::Rgba8Unorm,
            image_type: ImageType::D2,
            sampler: None,
            initial_data: None,
            name: String::new(),
        }
    }
}

impl ImageCreation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_mips(mut self, mips: u32) -> Self {
        self.mips = mips;
        self
    }

    pub fn with_usage(mut self, usage: ImageUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Cubemaps always have six layers.
    pub fn with_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        if image_type == ImageType::Cubemap {
            self.layers = 6;
        }
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerHandle) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Requested mip count clamped to the full chain of this extent.
    pub fn mip_count(&self) -> u32 {
        self.mips.clamp(1, max_mip_count(self.width, self.height))
    }
}

/// Views of one array layer, indexed by mip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayerViews {
    pub mip_views: Vec<GpuImageView>,
}

/// A GPU image owned by an [`ImageResourceManager`].
#[derive(Debug)]
pub struct Image {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layers: u32,
    pub mips: u32,
    pub format: Format,
    pub usage: ImageUsage,
    pub image_type: ImageType,
    pub sampler: Option<SamplerHandle>,
    /// View over every layer and mip.
    pub view: GpuImageView,
    pub layer_views: Vec<ImageLayerViews>,
    gpu: GpuImage,
}

impl Image {
    pub fn new(backend: &Backend, creation: &ImageCreation) -> RendererResult<Self> {
        if creation.width == 0 || creation.height == 0 || creation.depth == 0 || creation.layers == 0
        {
            return Err(BackendError::ImageCreationFailed(format!(
                "image '{}' has a zero-sized dimension ({}x{}x{}, {} layers)",
                creation.name, creation.width, creation.height, creation.depth, creation.layers
            ))
            .into());
        }

        let mips = creation.mip_count();
        if mips != creation.mips {
            log::debug!(
                "Image '{}': clamped mip count {} to {}",
                creation.name,
                creation.mips,
                mips
            );
        }

        let gpu = backend.create_image(creation)?;
        let layer_views = (0..creation.layers)
            .map(|layer| ImageLayerViews {
                mip_views: (0..mips)
                    .filter_map(|mip| gpu.mip_view(layer, mip))
                    .collect(),
            })
            .collect();

        Ok(Self {
            name: creation.name.clone(),
            width: creation.width,
            height: creation.height,
            depth: creation.depth,
            layers: creation.layers,
            mips,
            format: creation.format,
            usage: creation.usage,
            image_type: creation.image_type,
            sampler: creation.sampler,
            view: gpu.view(),
            layer_views,
            gpu,
        })
    }

    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    /// Extent of `mip`, never smaller than 1x1.
    pub fn mip_extent(&self, mip: u32) -> Extent2D {
        Extent2D::new((self.width >> mip).max(1), (self.height >> mip).max(1))
    }

    pub fn aspect(&self) -> ImageAspect {
        self.format.aspect()
    }

    pub fn is_depth(&self) -> bool {
        self.format.is_depth()
    }

    pub fn mip_view(&self, layer: u32, mip: u32) -> Option<GpuImageView> {
        self.layer_views
            .get(layer as usize)
            .and_then(|views| views.mip_views.get(mip as usize))
            .copied()
    }

    pub fn gpu(&self) -> &GpuImage {
        &self.gpu
    }
}

/// Pool of [`Image`]s.
#[derive(Debug, Default)]
pub struct ImageResourceManager {
    pool: ResourceManager<Image>,
}

impl ImageResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, backend: &Backend, creation: &ImageCreation) -> RendererResult<ImageHandle> {
        let image = Image::new(backend, creation)?;
        Ok(self.pool.create(image))
    }
}

impl Deref for ImageResourceManager {
    type Target = ResourceManager<Image>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl DerefMut for ImageResourceManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, 1)]
    #[case(256, 256, 9)]
    #[case(1280, 720, 11)]
    #[case(2048, 1, 12)]
    fn test_max_mip_count(#[case] width: u32, #[case] height: u32, #[case] expected: u32) {
        assert_eq!(max_mip_count(width, height), expected);
    }

    #[test]
    fn test_mip_count_is_clamped() {
        let creation = ImageCreation::new().with_size(16, 8).with_mips(32);
        assert_eq!(creation.mip_count(), 5);
        assert_eq!(ImageCreation::new().with_mips(0).mip_count(), 1);
    }

    #[test]
    fn test_create_image_views() {
        let backend = Backend::dummy();
        let mut images = ImageResourceManager::new();
        let handle = images
            .create(
                &backend,
                &ImageCreation::new()
                    .with_size(64, 32)
                    .with_mips(4)
                    .with_type(ImageType::Cubemap)
                    .with_name("Environment"),
            )
            .unwrap();

        let image = images.access(handle);
        assert_eq!(image.layers, 6);
        assert_eq!(image.layer_views.len(), 6);
        assert_eq!(image.layer_views[5].mip_views.len(), 4);
        assert_eq!(image.mip_extent(3), Extent2D::new(8, 4));
        assert!(image.mip_view(6, 0).is_none());
    }

    #[test]
    fn test_zero_sized_image_fails() {
        let backend = Backend::dummy();
        let mut images = ImageResourceManager::new();
        let result = images.create(&backend, &ImageCreation::new().with_size(0, 4));
        assert!(result.is_err());
        assert!(images.is_empty());
    }

    #[test]
    fn test_depth_image_aspect() {
        let backend = Backend::dummy();
        let image = Image::new(
            &backend,
            &ImageCreation::new()
                .with_format(Format::D32Sfloat)
                .with_usage(ImageUsage::DEPTH_STENCIL_ATTACHMENT),
        )
        .unwrap();
        assert!(image.is_depth());
        assert_eq!(image.aspect(), ImageAspect::DEPTH);
    }
}
