//! Graphics context: the backend plus everything created through it.

use std::sync::Arc;

use crate::backend::{Backend, DescriptorBinding};
use crate::config::RendererConfig;
use crate::error::RendererResult;
use crate::pipeline::{DescriptorSetLayout, DescriptorSetLayoutCache};
use crate::resources::{
    BufferCreation, BufferHandle, GpuResources, ImageCreation, ImageHandle, SamplerCreation,
    SamplerHandle,
};

/// Owns the backend, the resource managers and the descriptor set layout cache.
///
/// Resources are declared before the backend so they are released while the
/// device is still alive.
#[derive(Debug)]
pub struct GraphicsContext {
    resources: GpuResources,
    layout_cache: DescriptorSetLayoutCache,
    config: RendererConfig,
    backend: Backend,
}

impl GraphicsContext {
    pub fn new(backend: Backend, config: RendererConfig) -> RendererResult<Self> {
        config.validate()?;
        log::info!("Creating graphics context on {}", backend.name());
        Ok(Self {
            resources: GpuResources::new(),
            layout_cache: DescriptorSetLayoutCache::new(),
            config,
            backend,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut GpuResources {
        &mut self.resources
    }

    /// Backend and resources borrowed together, for code creating resources
    /// through the managers directly.
    pub fn split_mut(&mut self) -> (&Backend, &mut GpuResources) {
        (&self.backend, &mut self.resources)
    }

    pub fn layout_cache(&self) -> &DescriptorSetLayoutCache {
        &self.layout_cache
    }

    pub fn descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
        push_descriptor: bool,
    ) -> RendererResult<Arc<DescriptorSetLayout>> {
        self.layout_cache
            .get_or_create(&self.backend, bindings, push_descriptor)
    }

    pub fn create_image(&mut self, creation: &ImageCreation) -> RendererResult<ImageHandle> {
        self.resources.images.create(&self.backend, creation)
    }

    pub fn create_buffer(&mut self, creation: &BufferCreation) -> RendererResult<BufferHandle> {
        self.resources.buffers.create(&self.backend, creation)
    }

    pub fn create_sampler(&mut self, creation: &SamplerCreation) -> RendererResult<SamplerHandle> {
        self.resources.samplers.create(&self.backend, creation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RendererError;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RendererConfig {
            max_static_instances: 7,
            ..Default::default()
        };
        assert!(matches!(
            GraphicsContext::new(Backend::dummy(), config),
            Err(RendererError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_create_through_context() {
        let mut context = GraphicsContext::new(Backend::dummy(), RendererConfig::default()).unwrap();
        let image = context
            .create_image(&ImageCreation::new().with_size(4, 4).with_name("Tiny"))
            .unwrap();
        let buffer = context.create_buffer(&BufferCreation::new(32)).unwrap();

        assert_eq!(context.resources().images.access(image).name, "Tiny");
        assert!(context.resources().buffers.is_valid(buffer));

        let (backend, resources) = context.split_mut();
        resources.samplers.create(backend, &SamplerCreation::new()).unwrap();
        assert_eq!(context.resources().samplers.len(), 1);
    }
}
