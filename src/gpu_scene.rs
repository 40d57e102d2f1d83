//! Per-frame instance and draw-command data gathered from the ECS world.

use bevy_ecs::prelude::*;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::backend::{Backend, BufferUsage, MemoryUsage};
use crate::config::RendererConfig;
use crate::error::{RendererError, RendererResult};
use crate::resources::{
    BufferCreation, BufferHandle, BufferResourceManager, GpuResources, MaterialGpuInfo, MeshHandle,
};
use crate::scene::{SkinnedMeshRenderer, StaticMeshRenderer, Transform};

/// Per-draw instance data read by the culling and geometry shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: Mat4,
    /// Slot of the primitive's material in the scene's material buffer
    pub material_index: u32,
    /// Object-space radius; scaled by the model matrix when culling.
    pub bounding_radius: f32,
    pub _padding: [u32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InstanceData>(), 80);

impl InstanceData {
    /// World-space bounding sphere as `(center, radius)`.
    pub fn world_sphere(&self) -> (Vec3, f32) {
        let scale = self
            .model
            .x_axis
            .truncate()
            .length()
            .max(self.model.y_axis.truncate().length())
            .max(self.model.z_axis.truncate().length());
        (self.model.w_axis.truncate(), self.bounding_radius * scale)
    }
}

/// Layout of `VkDrawIndexedIndirectCommand`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DrawIndexedIndirectCommand>(), 20);

/// Contiguous range of draws belonging to one geometry class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawRange {
    pub offset: u32,
    pub count: u32,
}

impl DrawRange {
    pub fn end(&self) -> u32 {
        self.offset + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Renderable instances of the scene, flattened to one draw per mesh primitive.
///
/// Static draws come first, skinned draws follow, and draw `i` always reads
/// instance `i`. Instances, draws and material factors each live in one
/// buffer per frame in flight.
#[derive(Debug)]
pub struct GpuScene {
    instance_buffers: Vec<BufferHandle>,
    draw_buffers: Vec<BufferHandle>,
    material_buffers: Vec<BufferHandle>,
    instances: Vec<InstanceData>,
    draw_commands: Vec<DrawIndexedIndirectCommand>,
    materials: Vec<MaterialGpuInfo>,
    static_draws: DrawRange,
    skinned_draws: DrawRange,
    max_instances: u32,
    max_static_instances: u32,
    max_skinned_instances: u32,
    max_materials: u32,
}

impl GpuScene {
    pub fn new(
        backend: &Backend,
        buffers: &mut BufferResourceManager,
        config: &RendererConfig,
    ) -> RendererResult<Self> {
        config.validate()?;

        let mut instance_buffers = Vec::with_capacity(config.frames_in_flight as usize);
        let mut draw_buffers = Vec::with_capacity(config.frames_in_flight as usize);
        let mut material_buffers = Vec::with_capacity(config.frames_in_flight as usize);
        for frame in 0..config.frames_in_flight {
            instance_buffers.push(buffers.create(
                backend,
                &BufferCreation::new(
                    std::mem::size_of::<InstanceData>() as u64 * config.max_instances as u64,
                )
                .with_usage(BufferUsage::STORAGE)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("[{frame}] Instance Buffer")),
            )?);
            draw_buffers.push(buffers.create(
                backend,
                &BufferCreation::new(
                    std::mem::size_of::<DrawIndexedIndirectCommand>() as u64
                        * config.max_instances as u64,
                )
                .with_usage(BufferUsage::STORAGE | BufferUsage::INDIRECT)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("[{frame}] Draw Commands Buffer")),
            )?);
            material_buffers.push(buffers.create(
                backend,
                &BufferCreation::new(
                    std::mem::size_of::<MaterialGpuInfo>() as u64 * config.max_materials as u64,
                )
                .with_usage(BufferUsage::STORAGE)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("[{frame}] Material Buffer")),
            )?);
        }

        Ok(Self {
            instance_buffers,
            draw_buffers,
            material_buffers,
            instances: Vec::with_capacity(config.max_instances as usize),
            draw_commands: Vec::with_capacity(config.max_instances as usize),
            materials: Vec::new(),
            static_draws: DrawRange::default(),
            skinned_draws: DrawRange::default(),
            max_instances: config.max_instances,
            max_static_instances: config.max_static_instances,
            max_skinned_instances: config.max_skinned_instances,
            max_materials: config.max_materials,
        })
    }

    /// Gather every renderable of `world` and upload it into the buffers of
    /// `current_frame`.
    ///
    /// Nothing is uploaded when a capacity is exceeded or a mesh handle is
    /// stale; the previous frame's data stays in place.
    pub fn update(
        &mut self,
        world: &mut World,
        resources: &mut GpuResources,
        current_frame: u32,
    ) -> RendererResult<()> {
        let mut static_query = world.query::<(&Transform, &StaticMeshRenderer)>();
        let static_meshes: Vec<(Mat4, MeshHandle)> = static_query
            .iter(world)
            .map(|(transform, renderer)| (transform.matrix(), renderer.mesh))
            .collect();
        let mut skinned_query = world.query::<(&Transform, &SkinnedMeshRenderer)>();
        let skinned_meshes: Vec<(Mat4, MeshHandle)> = skinned_query
            .iter(world)
            .map(|(transform, renderer)| (transform.matrix(), renderer.mesh))
            .collect();

        self.set_draws(resources, &static_meshes, &skinned_meshes)?;
        self.upload(&mut resources.buffers, current_frame)
    }

    /// Rebuild the CPU-side instance and draw lists from `(model, mesh)` pairs,
    /// and snapshot the material factors of every material slot.
    pub fn set_draws(
        &mut self,
        resources: &GpuResources,
        static_meshes: &[(Mat4, MeshHandle)],
        skinned_meshes: &[(Mat4, MeshHandle)],
    ) -> RendererResult<()> {
        let mut instances = Vec::with_capacity(self.instances.capacity());
        let mut draw_commands = Vec::with_capacity(self.draw_commands.capacity());

        let static_count = Self::flatten(resources, static_meshes, &mut instances, &mut draw_commands)?;
        let skinned_count = Self::flatten(resources, skinned_meshes, &mut instances, &mut draw_commands)?;
        let materials = resources.materials.gpu_infos();

        for (what, capacity, requested) in [
            ("scene draws", self.max_instances, static_count + skinned_count),
            ("static draws", self.max_static_instances, static_count),
            ("skinned draws", self.max_skinned_instances, skinned_count),
            ("materials", self.max_materials, materials.len()),
        ] {
            if requested > capacity as usize {
                return Err(RendererError::CapacityExceeded {
                    what,
                    capacity: capacity as usize,
                    requested,
                });
            }
        }

        self.static_draws = DrawRange {
            offset: 0,
            count: static_count as u32,
        };
        self.skinned_draws = DrawRange {
            offset: static_count as u32,
            count: skinned_count as u32,
        };
        self.instances = instances;
        self.draw_commands = draw_commands;
        self.materials = materials;
        log::trace!(
            "Gathered {} static and {} skinned draws",
            static_count,
            skinned_count
        );
        Ok(())
    }

    fn flatten(
        resources: &GpuResources,
        meshes: &[(Mat4, MeshHandle)],
        instances: &mut Vec<InstanceData>,
        draw_commands: &mut Vec<DrawIndexedIndirectCommand>,
    ) -> RendererResult<usize> {
        let start = draw_commands.len();
        for (model, handle) in meshes {
            let mesh = resources
                .meshes
                .get(*handle)
                .ok_or(RendererError::InvalidHandle { kind: "mesh" })?;
            for primitive in &mesh.primitives {
                instances.push(InstanceData {
                    model: *model,
                    material_index: primitive.material.index(),
                    bounding_radius: primitive.bounding_radius,
                    _padding: [0; 2],
                });
                draw_commands.push(DrawIndexedIndirectCommand {
                    index_count: primitive.index_count,
                    instance_count: 1,
                    first_index: primitive.first_index,
                    vertex_offset: primitive.vertex_offset,
                    first_instance: 0,
                });
            }
        }
        Ok(draw_commands.len() - start)
    }

    /// Write the CPU-side lists into the buffers of `current_frame`.
    pub fn upload(&self, buffers: &mut BufferResourceManager, current_frame: u32) -> RendererResult<()> {
        if self.draw_commands.is_empty() {
            return Ok(());
        }
        let slot = current_frame as usize % self.instance_buffers.len();
        buffers
            .access_mut(self.instance_buffers[slot])
            .write_pod(0, &self.instances)?;
        buffers
            .access_mut(self.draw_buffers[slot])
            .write_pod(0, &self.draw_commands)?;
        buffers
            .access_mut(self.material_buffers[slot])
            .write_pod(0, &self.materials)?;
        Ok(())
    }

    pub fn instance_buffer(&self, current_frame: u32) -> BufferHandle {
        self.instance_buffers[current_frame as usize % self.instance_buffers.len()]
    }

    pub fn draw_buffer(&self, current_frame: u32) -> BufferHandle {
        self.draw_buffers[current_frame as usize % self.draw_buffers.len()]
    }

    pub fn material_buffer(&self, current_frame: u32) -> BufferHandle {
        self.material_buffers[current_frame as usize % self.material_buffers.len()]
    }

    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    pub fn draw_commands(&self) -> &[DrawIndexedIndirectCommand] {
        &self.draw_commands
    }

    pub fn materials(&self) -> &[MaterialGpuInfo] {
        &self.materials
    }

    pub fn static_draws(&self) -> DrawRange {
        self.static_draws
    }

    pub fn skinned_draws(&self) -> DrawRange {
        self.skinned_draws
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_commands.len() as u32
    }

    /// Total number of indices over `range`, for draw statistics.
    pub fn index_count(&self, range: DrawRange) -> u64 {
        self.draw_commands[range.offset as usize..range.end() as usize]
            .iter()
            .map(|command| command.index_count as u64)
            .sum()
    }

    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }

    pub fn destroy(self, buffers: &mut BufferResourceManager) {
        for handle in self
            .instance_buffers
            .into_iter()
            .chain(self.draw_buffers)
            .chain(self.material_buffers)
        {
            buffers.destroy(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{MaterialCreation, MeshCreation, MeshPrimitive};
    use glam::{Quat, Vec4};
    use rstest::rstest;

    fn setup(config: &RendererConfig) -> (Backend, GpuResources, GpuScene, MeshHandle) {
        let backend = Backend::dummy();
        let mut resources = GpuResources::new();
        let scene = GpuScene::new(&backend, &mut resources.buffers, config).unwrap();
        let material = resources
            .materials
            .create(&resources.images, &MaterialCreation::default())
            .unwrap();
        let mesh = resources
            .meshes
            .create(
                &resources.materials,
                MeshCreation {
                    name: "Quad".into(),
                    primitives: vec![MeshPrimitive {
                        index_count: 6,
                        first_index: 12,
                        vertex_offset: 4,
                        material,
                        bounding_radius: 1.5,
                    }],
                },
            )
            .unwrap();
        (backend, resources, scene, mesh)
    }

    fn spawn_static(world: &mut World, mesh: MeshHandle, count: usize) {
        world.spawn_batch(
            (0..count).map(move |i| (Transform::from_position(Vec3::X * i as f32), StaticMeshRenderer { mesh })),
        );
    }

    #[test]
    fn test_static_draws_precede_skinned() {
        let config = RendererConfig::default();
        let (_backend, mut resources, mut scene, mesh) = setup(&config);
        let mut world = World::new();
        world.spawn((Transform::from_position(Vec3::Y), SkinnedMeshRenderer { mesh }));
        spawn_static(&mut world, mesh, 2);

        scene.update(&mut world, &mut resources, 1).unwrap();

        assert_eq!(scene.static_draws(), DrawRange { offset: 0, count: 2 });
        assert_eq!(scene.skinned_draws(), DrawRange { offset: 2, count: 1 });
        assert_eq!(scene.instances()[2].model.w_axis.truncate(), Vec3::Y);
        assert_eq!(scene.index_count(scene.static_draws()), 12);

        let uploaded = resources
            .buffers
            .access(scene.draw_buffer(1))
            .read_pod::<DrawIndexedIndirectCommand>(0, 3)
            .unwrap();
        assert_eq!(
            uploaded[0],
            DrawIndexedIndirectCommand {
                index_count: 6,
                instance_count: 1,
                first_index: 12,
                vertex_offset: 4,
                first_instance: 0,
            }
        );
    }

    #[test]
    fn test_materials_uploaded_by_slot() {
        let config = RendererConfig::default();
        let (_backend, mut resources, mut scene, _quad) = setup(&config);
        let red = resources
            .materials
            .create(
                &resources.images,
                &MaterialCreation {
                    albedo_factor: Vec4::new(1.0, 0.0, 0.0, 1.0),
                    metallic_factor: 0.75,
                    ..Default::default()
                },
            )
            .unwrap();
        let mesh = resources
            .meshes
            .create(
                &resources.materials,
                MeshCreation {
                    name: "Red Quad".into(),
                    primitives: vec![MeshPrimitive {
                        index_count: 6,
                        first_index: 0,
                        vertex_offset: 0,
                        material: red,
                        bounding_radius: 1.0,
                    }],
                },
            )
            .unwrap();
        let mut world = World::new();
        spawn_static(&mut world, mesh, 1);

        scene.update(&mut world, &mut resources, 2).unwrap();

        let slot = scene.instances()[0].material_index as usize;
        assert_eq!(slot, red.index() as usize);
        let uploaded = resources
            .buffers
            .access(scene.material_buffer(2))
            .read_pod::<MaterialGpuInfo>(0, 2)
            .unwrap();
        assert_eq!(uploaded[slot].albedo_factor, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(uploaded[slot].metallic_factor, 0.75);
        assert_eq!(uploaded, scene.materials());
    }

    #[test]
    fn test_material_capacity_is_checked() {
        let config = RendererConfig {
            max_materials: 1,
            ..Default::default()
        };
        let (_backend, mut resources, mut scene, mesh) = setup(&config);
        resources
            .materials
            .create(&resources.images, &MaterialCreation::default())
            .unwrap();
        let mut world = World::new();
        spawn_static(&mut world, mesh, 1);

        assert_eq!(
            scene.update(&mut world, &mut resources, 0),
            Err(RendererError::CapacityExceeded {
                what: "materials",
                capacity: 1,
                requested: 2,
            })
        );
        assert!(scene.materials().is_empty());
    }

    #[rstest]
    #[case(2048, true)]
    #[case(2049, false)]
    fn test_instance_capacity_boundary(#[case] count: usize, #[case] accepted: bool) {
        let config = RendererConfig::default();
        let (_backend, mut resources, mut scene, mesh) = setup(&config);
        let mut world = World::new();
        spawn_static(&mut world, mesh, count);

        let result = scene.update(&mut world, &mut resources, 0);
        if accepted {
            assert!(result.is_ok());
            assert_eq!(scene.draw_count(), config.max_instances);
        } else {
            assert_eq!(
                result,
                Err(RendererError::CapacityExceeded {
                    what: "scene draws",
                    capacity: 2048,
                    requested: 2049,
                })
            );
            assert_eq!(scene.draw_count(), 0);
        }
    }

    #[test]
    fn test_stale_mesh_is_rejected() {
        let config = RendererConfig::default();
        let (_backend, mut resources, mut scene, mesh) = setup(&config);
        let mut world = World::new();
        spawn_static(&mut world, mesh, 1);
        resources.meshes.destroy(mesh);

        assert_eq!(
            scene.update(&mut world, &mut resources, 0),
            Err(RendererError::InvalidHandle { kind: "mesh" })
        );
    }

    #[test]
    fn test_world_sphere_uses_largest_scale() {
        let instance = InstanceData {
            model: Mat4::from_scale_rotation_translation(
                Vec3::new(1.0, 3.0, 2.0),
                Quat::from_rotation_y(0.7),
                Vec3::new(5.0, 0.0, -2.0),
            ),
            material_index: 0,
            bounding_radius: 2.0,
            _padding: [0; 2],
        };
        let (center, radius) = instance.world_sphere();
        assert!((center - Vec3::new(5.0, 0.0, -2.0)).length() < 1e-5);
        assert!((radius - 6.0).abs() < 1e-4);
    }
}
