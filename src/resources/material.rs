//! PBR materials referencing pooled images.

use std::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::error::{RendererError, RendererResult};

use super::handle::ResourceHandle;
use super::image::{ImageHandle, ImageResourceManager};
use super::manager::ResourceManager;

pub type MaterialHandle = ResourceHandle<Material>;

/// Parameters for creating a [`Material`]. Missing maps fall back to the factors.
#[derive(Debug, Clone)]
pub struct MaterialCreation {
    pub name: String,
    pub albedo_map: Option<ImageHandle>,
    pub albedo_factor: Vec4,
    pub metallic_roughness_map: Option<ImageHandle>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_map: Option<ImageHandle>,
    pub normal_scale: f32,
    pub occlusion_map: Option<ImageHandle>,
    pub occlusion_strength: f32,
    pub emissive_map: Option<ImageHandle>,
    pub emissive_factor: Vec3,
}

impl Default for MaterialCreation {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo_map: None,
            albedo_factor: Vec4::ONE,
            metallic_roughness_map: None,
            metallic_factor: 0.0,
            roughness_factor: 0.5,
            normal_map: None,
            normal_scale: 1.0,
            occlusion_map: None,
            occlusion_strength: 1.0,
            emissive_map: None,
            emissive_factor: Vec3::ZERO,
        }
    }
}

/// Material factors uploaded to the scene's material buffer, indexed by
/// [`InstanceData::material_index`](crate::gpu_scene::InstanceData).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialGpuInfo {
    pub albedo_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive_factor: [f32; 3],
    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MaterialGpuInfo>(), 48);

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub albedo_map: Option<ImageHandle>,
    pub albedo_factor: Vec4,
    pub metallic_roughness_map: Option<ImageHandle>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_map: Option<ImageHandle>,
    pub normal_scale: f32,
    pub occlusion_map: Option<ImageHandle>,
    pub occlusion_strength: f32,
    pub emissive_map: Option<ImageHandle>,
    pub emissive_factor: Vec3,
}

impl Material {
    /// Every referenced map must be alive in `images`.
    pub fn new(creation: &MaterialCreation, images: &ImageResourceManager) -> RendererResult<Self> {
        let maps = [
            creation.albedo_map,
            creation.metallic_roughness_map,
            creation.normal_map,
            creation.occlusion_map,
            creation.emissive_map,
        ];
        if maps.iter().flatten().any(|map| !images.is_valid(*map)) {
            return Err(RendererError::InvalidHandle { kind: "image" });
        }

        Ok(Self {
            name: creation.name.clone(),
            albedo_map: creation.albedo_map,
            albedo_factor: creation.albedo_factor,
            metallic_roughness_map: creation.metallic_roughness_map,
            metallic_factor: creation.metallic_factor,
            roughness_factor: creation.roughness_factor,
            normal_map: creation.normal_map,
            normal_scale: creation.normal_scale,
            occlusion_map: creation.occlusion_map,
            occlusion_strength: creation.occlusion_strength,
            emissive_map: creation.emissive_map,
            emissive_factor: creation.emissive_factor,
        })
    }

    pub fn gpu_info(&self) -> MaterialGpuInfo {
        MaterialGpuInfo {
            albedo_factor: self.albedo_factor.to_array(),
            metallic_factor: self.metallic_factor,
            roughness_factor: self.roughness_factor,
            normal_scale: self.normal_scale,
            occlusion_strength: self.occlusion_strength,
            emissive_factor: self.emissive_factor.to_array(),
            _padding: 0,
        }
    }
}

/// Pool of [`Material`]s.
#[derive(Debug, Default)]
pub struct MaterialResourceManager {
    pool: ResourceManager<Material>,
}

impl MaterialResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        images: &ImageResourceManager,
        creation: &MaterialCreation,
    ) -> RendererResult<MaterialHandle> {
        let material = Material::new(creation, images)?;
        log::trace!("Created material {:?}", material.name);
        Ok(self.pool.create(material))
    }

    /// GPU infos indexed by material slot, matching the slot index stored in
    /// each instance. Free slots hold zeroed entries.
    pub fn gpu_infos(&self) -> Vec<MaterialGpuInfo> {
        let mut infos = vec![MaterialGpuInfo::zeroed(); self.capacity()];
        for (handle, material) in self.iter() {
            infos[handle.index() as usize] = material.gpu_info();
        }
        infos
    }
}

impl Deref for MaterialResourceManager {
    type Target = ResourceManager<Material>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl DerefMut for MaterialResourceManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::resources::ImageCreation;

    #[test]
    fn test_gpu_infos_follow_slots() {
        let mut materials = MaterialResourceManager::new();
        let images = ImageResourceManager::new();
        let first = materials.create(&images, &MaterialCreation::default()).unwrap();
        let rough = materials
            .create(
                &images,
                &MaterialCreation {
                    albedo_factor: Vec4::new(0.5, 0.25, 1.0, 1.0),
                    roughness_factor: 0.9,
                    emissive_factor: Vec3::X,
                    ..Default::default()
                },
            )
            .unwrap();
        materials.destroy(first);

        let infos = materials.gpu_infos();
        assert_eq!(infos.len(), materials.capacity());
        assert_eq!(infos[first.index() as usize], MaterialGpuInfo::zeroed());
        let info = infos[rough.index() as usize];
        assert_eq!(info, materials.access(rough).gpu_info());
        assert_eq!(info.albedo_factor, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(info.roughness_factor, 0.9);
        assert_eq!(info.emissive_factor, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_destroyed_map_is_rejected() {
        let backend = Backend::dummy();
        let mut images = ImageResourceManager::new();
        let map = images.create(&backend, &ImageCreation::new()).unwrap();
        images.destroy(map);

        let mut materials = MaterialResourceManager::new();
        let result = materials.create(
            &images,
            &MaterialCreation {
                normal_map: Some(map),
                ..Default::default()
            },
        );
        assert_eq!(result.unwrap_err(), RendererError::InvalidHandle { kind: "image" });
    }
}
