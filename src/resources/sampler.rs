//! Texture samplers.

use std::ops::{Deref, DerefMut};

use crate::backend::{
    AddressMode, Backend, BorderColor, CompareOp, Filter, GpuSampler, MipmapMode, ReductionMode,
};
use crate::error::RendererResult;

use super::handle::ResourceHandle;
use super::manager::ResourceManager;

pub type SamplerHandle = ResourceHandle<Sampler>;

/// Parameters for creating a [`Sampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerCreation {
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: MipmapMode,
    /// Clamp anisotropy to the device maximum instead of `max_anisotropy`.
    pub use_max_anisotropy: bool,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub border_color: BorderColor,
    pub unnormalized_coordinates: bool,
    pub compare_enable: bool,
    pub compare_op: CompareOp,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub reduction_mode: ReductionMode,
    pub name: String,
}

impl Default for SamplerCreation {
    fn default() -> Self {
        Self {
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_mode: MipmapMode::Linear,
            use_max_anisotropy: true,
            anisotropy_enable: true,
            max_anisotropy: 16.0,
            border_color: BorderColor::IntOpaqueBlack,
            unnormalized_coordinates: false,
            compare_enable: false,
            compare_op: CompareOp::Always,
            mip_lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: 1.0,
            reduction_mode: ReductionMode::WeightedAverage,
            name: String::new(),
        }
    }
}

impl SamplerCreation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the same address mode on all three axes.
    pub fn with_global_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    pub fn with_filters(mut self, min_filter: Filter, mag_filter: Filter) -> Self {
        self.min_filter = min_filter;
        self.mag_filter = mag_filter;
        self
    }

    pub fn with_mipmap_mode(mut self, mode: MipmapMode) -> Self {
        self.mipmap_mode = mode;
        self
    }

    pub fn with_anisotropy(mut self, enable: bool) -> Self {
        self.anisotropy_enable = enable;
        self
    }

    pub fn with_border_color(mut self, color: BorderColor) -> Self {
        self.border_color = color;
        self
    }

    pub fn with_compare(mut self, op: CompareOp) -> Self {
        self.compare_enable = true;
        self.compare_op = op;
        self
    }

    pub fn with_lod(mut self, min_lod: f32, max_lod: f32) -> Self {
        self.min_lod = min_lod;
        self.max_lod = max_lod;
        self
    }

    pub fn with_reduction_mode(mut self, mode: ReductionMode) -> Self {
        self.reduction_mode = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug)]
pub struct Sampler {
    pub name: String,
    pub description: SamplerCreation,
    gpu: GpuSampler,
}

impl Sampler {
    pub fn new(backend: &Backend, creation: &SamplerCreation) -> RendererResult<Self> {
        let gpu = backend.create_sampler(creation)?;
        Ok(Self {
            name: creation.name.clone(),
            description: creation.clone(),
            gpu,
        })
    }

    pub fn gpu(&self) -> &GpuSampler {
        &self.gpu
    }
}

/// Pool of [`Sampler`]s.
#[derive(Debug, Default)]
pub struct SamplerResourceManager {
    pool: ResourceManager<Sampler>,
}

impl SamplerResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, backend: &Backend, creation: &SamplerCreation) -> RendererResult<SamplerHandle> {
        let sampler = Sampler::new(backend, creation)?;
        Ok(self.pool.create(sampler))
    }
}

impl Deref for SamplerResourceManager {
    type Target = ResourceManager<Sampler>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl DerefMut for SamplerResourceManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pool
    }
}
