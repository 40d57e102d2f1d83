//! Vulkan backend built on ash and gpu-allocator.
//!
//! The backend does not create the instance or device itself. The embedding
//! application creates them (with Vulkan 1.3, `synchronization2`,
//! `dynamic_rendering`, `drawIndirectCount`, `samplerFilterMinmax` and
//! `VK_KHR_push_descriptor` enabled) and hands them over through
//! [`VulkanBackend::from_raw`]. The backend owns the memory allocator and a
//! command pool for one-shot uploads.
//!
//! GPU objects created here keep a clone of the device and, for memory
//! backed objects, the allocator. They must be dropped before the device is
//! destroyed.

mod commands;
mod conversion;

pub use commands::VulkanCommandRecorder;

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::pipeline::PipelineDescriptor;
use crate::resources::{BufferCreation, GpuResources, ImageCreation, SamplerCreation};

use super::types::*;
use super::{
    BackendError, BackendResult, GpuBuffer, GpuDescriptorSetLayout, GpuImage, GpuPipeline,
    GpuSampler,
};

use self::conversion::*;

/// Vulkan-based GPU backend.
pub struct VulkanBackend {
    device: ash::Device,
    queue: vk::Queue,
    allocator: Arc<Mutex<Allocator>>,
    /// Guarded because one-shot submissions may come from any thread.
    command_pool: Mutex<vk::CommandPool>,
    push_descriptor: ash::khr::push_descriptor::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    max_sampler_anisotropy: f32,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("debug_utils", &self.debug_utils.is_some())
            .field("max_sampler_anisotropy", &self.max_sampler_anisotropy)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Wrap an existing device.
    ///
    /// `debug_utils` enables object names and command buffer labels; the
    /// instance must have been created with `VK_EXT_debug_utils` for it.
    pub fn from_raw(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family: u32,
        debug_utils: bool,
    ) -> BackendResult<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
        })?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let push_descriptor = ash::khr::push_descriptor::Device::new(instance, &device);
        let debug_utils =
            debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        log::info!(
            "Vulkan backend initialized (queue family: {}, debug utils: {})",
            queue_family,
            debug_utils.is_some()
        );

        Ok(Self {
            device,
            queue,
            allocator: Arc::new(Mutex::new(allocator)),
            command_pool: Mutex::new(command_pool),
            push_descriptor,
            debug_utils,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
        })
    }

    pub fn name(&self) -> &'static str {
        "Vulkan Backend"
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn allocator(&self) -> Arc<Mutex<Allocator>> {
        self.allocator.clone()
    }

    /// Recorder writing into `cmd`, resolving handles through `resources`.
    pub fn recorder<'a>(
        &'a self,
        cmd: vk::CommandBuffer,
        resources: &'a GpuResources,
    ) -> VulkanCommandRecorder<'a> {
        VulkanCommandRecorder::new(
            &self.device,
            &self.push_descriptor,
            self.debug_utils.as_ref(),
            resources,
            cmd,
        )
    }

    fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        if name.is_empty() {
            return;
        }
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("Failed to name Vulkan object {:?}: {:?}", name, e);
        }
    }

    /// Record and submit a one-shot command buffer, then wait for it.
    pub fn immediate_submit(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> BackendResult<()> {
        let command_pool = self.command_pool.lock();

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| {
                BackendError::SubmitFailed(format!("Failed to allocate command buffer: {:?}", e))
            })?;
        let cmd = command_buffers[0];

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
                BackendError::SubmitFailed(format!("Failed to begin command buffer: {:?}", e))
            })?;

            record(&self.device, cmd);

            unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| {
                BackendError::SubmitFailed(format!("Failed to end command buffer: {:?}", e))
            })?;

            let fence = unsafe {
                self.device
                    .create_fence(&vk::FenceCreateInfo::default(), None)
            }
            .map_err(|e| BackendError::SubmitFailed(format!("Failed to create fence: {:?}", e)))?;

            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let submitted = unsafe {
                self.device
                    .queue_submit(self.queue, &[submit_info], fence)
                    .and_then(|_| self.device.wait_for_fences(&[fence], true, u64::MAX))
            };
            unsafe { self.device.destroy_fence(fence, None) };

            submitted.map_err(|e| match e {
                vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
                e => BackendError::SubmitFailed(format!("Queue submission failed: {:?}", e)),
            })
        })();

        unsafe {
            self.device
                .free_command_buffers(*command_pool, &command_buffers);
        }
        result
    }

    pub fn create_buffer(&self, creation: &BufferCreation) -> BackendResult<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(creation.size)
            .usage(convert_buffer_usage(creation.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            BackendError::BufferCreationFailed(format!("{}: {:?}", creation.name, e))
        })?;

        // From here on dropping the wrapper releases everything created so far.
        let mut gpu = GpuBuffer::Vulkan {
            device: self.device.clone(),
            allocator: self.allocator.clone(),
            buffer,
            allocation: None,
            size: creation.size,
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let location = if creation.mappable {
            convert_memory_usage(creation.memory)
        } else {
            MemoryLocation::GpuOnly
        };

        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: &creation.name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => BackendError::OutOfMemory,
                e => BackendError::BufferCreationFailed(format!("{}: {}", creation.name, e)),
            })?;

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let GpuBuffer::Vulkan { allocation: slot, .. } = &mut gpu {
            *slot = Some(allocation);
        }
        bound.map_err(|e| {
            BackendError::BufferCreationFailed(format!(
                "Failed to bind memory of {}: {:?}",
                creation.name, e
            ))
        })?;

        self.set_object_name(buffer, &creation.name);
        log::trace!(
            "VulkanBackend: created buffer {:?} ({} bytes, {:?})",
            creation.name,
            creation.size,
            location
        );
        Ok(gpu)
    }

    pub fn create_image(&self, creation: &ImageCreation) -> BackendResult<GpuImage> {
        let format = convert_format(creation.format);
        let mips = creation.mip_count();

        let mut usage = convert_image_usage(creation.usage);
        if creation.initial_data.is_some() {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        let flags = if creation.image_type == ImageType::Cubemap {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_type = if creation.image_type == ImageType::D3 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type)
            .format(format)
            .extent(vk::Extent3D {
                width: creation.width,
                height: creation.height,
                depth: creation.depth,
            })
            .mip_levels(mips)
            .array_layers(creation.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            BackendError::ImageCreationFailed(format!("{}: {:?}", creation.name, e))
        })?;

        let mut gpu = GpuImage::Vulkan {
            device: self.device.clone(),
            allocator: self.allocator.clone(),
            image,
            view: vk::ImageView::null(),
            mip_views: Vec::new(),
            allocation: None,
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: &creation.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => BackendError::OutOfMemory,
                e => BackendError::ImageCreationFailed(format!("{}: {}", creation.name, e)),
            })?;
        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let GpuImage::Vulkan { allocation: slot, .. } = &mut gpu {
            *slot = Some(allocation);
        }
        bound.map_err(|e| {
            BackendError::ImageCreationFailed(format!(
                "Failed to bind memory of {}: {:?}",
                creation.name, e
            ))
        })?;

        // Sampled views of depth-stencil images only see depth.
        let view_aspect = if creation.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let full_view_type = match creation.image_type {
            ImageType::Cubemap => vk::ImageViewType::CUBE,
            ImageType::D3 => vk::ImageViewType::TYPE_3D,
            ImageType::D2 if creation.layers > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
            ImageType::D2 => vk::ImageViewType::TYPE_2D,
        };
        let single_view_type = if creation.image_type == ImageType::D3 {
            vk::ImageViewType::TYPE_3D
        } else {
            vk::ImageViewType::TYPE_2D
        };

        let full_view = self.create_image_view(
            image,
            format,
            full_view_type,
            vk::ImageSubresourceRange {
                aspect_mask: view_aspect,
                base_mip_level: 0,
                level_count: mips,
                base_array_layer: 0,
                layer_count: creation.layers,
            },
            &creation.name,
        )?;
        if let GpuImage::Vulkan { view, .. } = &mut gpu {
            *view = full_view;
        }

        for layer in 0..creation.layers {
            let mut layer_views = Vec::with_capacity(mips as usize);
            for mip in 0..mips {
                let created = self.create_image_view(
                    image,
                    format,
                    single_view_type,
                    vk::ImageSubresourceRange {
                        aspect_mask: view_aspect,
                        base_mip_level: mip,
                        level_count: 1,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    &creation.name,
                );
                match created {
                    Ok(view) => layer_views.push(view),
                    Err(e) => {
                        if let GpuImage::Vulkan { mip_views, .. } = &mut gpu {
                            mip_views.push(layer_views);
                        }
                        return Err(e);
                    }
                }
            }
            if let GpuImage::Vulkan { mip_views, .. } = &mut gpu {
                mip_views.push(layer_views);
            }
        }

        if let Some(data) = &creation.initial_data {
            self.upload_image(image, creation, data)?;
        }

        self.set_object_name(image, &creation.name);
        log::trace!(
            "VulkanBackend: created image {:?} ({}x{}x{}, {} layers, {} mips)",
            creation.name,
            creation.width,
            creation.height,
            creation.depth,
            creation.layers,
            mips
        );
        Ok(gpu)
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        view_type: vk::ImageViewType,
        range: vk::ImageSubresourceRange,
        name: &str,
    ) -> BackendResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(range);

        unsafe { self.device.create_image_view(&view_info, None) }.map_err(|e| {
            BackendError::ImageCreationFailed(format!("Failed to create view of {}: {:?}", name, e))
        })
    }

    /// Copy `data` into mip 0 of every layer and leave the image shader-readable.
    fn upload_image(&self, image: vk::Image, creation: &ImageCreation, data: &[u8]) -> BackendResult<()> {
        let mut staging = self.create_buffer(
            &BufferCreation::new(data.len() as u64)
                .with_usage(BufferUsage::TRANSFER_SRC)
                .with_memory(MemoryUsage::CpuToGpu)
                .with_name(format!("{} Staging", creation.name)),
        )?;
        let mapped = staging
            .mapped_mut()
            .ok_or_else(|| BackendError::NotMappable(format!("{} Staging", creation.name)))?;
        mapped[..data.len()].copy_from_slice(data);

        let staging_buffer = match &staging {
            GpuBuffer::Vulkan { buffer, .. } => *buffer,
            GpuBuffer::Dummy { .. } => vk::Buffer::null(),
        };

        let aspect = convert_image_aspect(creation.format.aspect());
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: creation.layers,
        };

        self.immediate_submit(|device, cmd| {
            let to_transfer = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range);

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: creation.layers,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: creation.width,
                    height: creation.height,
                    depth: creation.depth,
                });

            let to_shader_read = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range);

            unsafe {
                device.cmd_pipeline_barrier2(
                    cmd,
                    &vk::DependencyInfo::default().image_memory_barriers(&[to_transfer]),
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                device.cmd_pipeline_barrier2(
                    cmd,
                    &vk::DependencyInfo::default().image_memory_barriers(&[to_shader_read]),
                );
            }
        })
    }

    pub fn create_sampler(&self, creation: &SamplerCreation) -> BackendResult<GpuSampler> {
        let max_anisotropy = if creation.use_max_anisotropy {
            self.max_sampler_anisotropy
        } else {
            creation.max_anisotropy
        };

        let mut reduction = vk::SamplerReductionModeCreateInfo::default()
            .reduction_mode(convert_reduction_mode(creation.reduction_mode));

        let mut sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter(creation.mag_filter))
            .min_filter(convert_filter(creation.min_filter))
            .mipmap_mode(convert_mipmap_mode(creation.mipmap_mode))
            .address_mode_u(convert_address_mode(creation.address_mode_u))
            .address_mode_v(convert_address_mode(creation.address_mode_v))
            .address_mode_w(convert_address_mode(creation.address_mode_w))
            .mip_lod_bias(creation.mip_lod_bias)
            .anisotropy_enable(creation.anisotropy_enable)
            .max_anisotropy(max_anisotropy)
            .compare_enable(creation.compare_enable)
            .compare_op(convert_compare_op(creation.compare_op))
            .min_lod(creation.min_lod)
            .max_lod(creation.max_lod)
            .border_color(convert_border_color(creation.border_color))
            .unnormalized_coordinates(creation.unnormalized_coordinates);
        if creation.reduction_mode != ReductionMode::WeightedAverage {
            sampler_info = sampler_info.push_next(&mut reduction);
        }

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(|e| {
            BackendError::SamplerCreationFailed(format!("{}: {:?}", creation.name, e))
        })?;
        self.set_object_name(sampler, &creation.name);

        Ok(GpuSampler::Vulkan {
            device: self.device.clone(),
            sampler,
        })
    }

    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        push_descriptor: bool,
    ) -> BackendResult<GpuDescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(convert_descriptor_type(binding.ty))
                    .descriptor_count(binding.count)
                    .stage_flags(convert_shader_stages(binding.stages))
            })
            .collect();

        let flags = if push_descriptor {
            vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(&vk_bindings);

        let layout = unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| BackendError::DescriptorSetLayoutCreationFailed(format!("{:?}", e)))?;

        Ok(GpuDescriptorSetLayout::Vulkan {
            device: self.device.clone(),
            layout,
        })
    }

    pub fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_>) -> BackendResult<GpuPipeline> {
        let name = descriptor.name;

        let set_layouts = descriptor
            .set_layouts
            .iter()
            .map(|layout| match layout.gpu() {
                GpuDescriptorSetLayout::Vulkan { layout, .. } => Ok(*layout),
                GpuDescriptorSetLayout::Dummy => Err(BackendError::PipelineCreationFailed(format!(
                    "{}: descriptor set layout was not created by the Vulkan backend",
                    name
                ))),
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let push_constant_ranges: Vec<vk::PushConstantRange> = descriptor
            .push_constants
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: convert_shader_stages(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { self.device.create_pipeline_layout(&layout_info, None) }.map_err(|e| {
            BackendError::PipelineCreationFailed(format!("{}: pipeline layout: {:?}", name, e))
        })?;

        let pipeline = self.create_shader_pipeline(descriptor, layout);
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        self.set_object_name(pipeline, name);
        log::trace!(
            "VulkanBackend: created {:?} pipeline {:?}",
            descriptor.bind_point,
            name
        );
        Ok(GpuPipeline::Vulkan {
            device: self.device.clone(),
            pipeline,
            layout,
        })
    }

    fn create_shader_pipeline(
        &self,
        descriptor: &PipelineDescriptor<'_>,
        layout: vk::PipelineLayout,
    ) -> BackendResult<vk::Pipeline> {
        let name = descriptor.name;

        let mut modules = Vec::with_capacity(descriptor.stages.len());
        let mut entry_points = Vec::with_capacity(descriptor.stages.len());
        for stage in descriptor.stages {
            let entry_point = CString::new(stage.entry_point).map_err(|e| {
                BackendError::ShaderCreationFailed(format!("{}: invalid entry point: {}", name, e))
            });
            let module_info = vk::ShaderModuleCreateInfo::default().code(stage.spirv);
            let module = entry_point.and_then(|entry_point| {
                unsafe { self.device.create_shader_module(&module_info, None) }
                    .map(|module| (module, entry_point))
                    .map_err(|e| BackendError::ShaderCreationFailed(format!("{}: {:?}", name, e)))
            });
            match module {
                Ok((module, entry_point)) => {
                    modules.push(module);
                    entry_points.push(entry_point);
                }
                Err(e) => {
                    self.destroy_shader_modules(&modules);
                    return Err(e);
                }
            }
        }

        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = descriptor
            .stages
            .iter()
            .zip(modules.iter().zip(entry_points.iter()))
            .map(|(stage, (module, entry_point))| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(convert_shader_stages(stage.stage))
                    .module(*module)
                    .name(entry_point)
            })
            .collect();

        let result = match (descriptor.bind_point, descriptor.graphics) {
            (PipelineBindPoint::Compute, _) => match stage_infos.first() {
                Some(stage) => {
                    let pipeline_info = vk::ComputePipelineCreateInfo::default()
                        .stage(*stage)
                        .layout(layout);
                    unsafe {
                        self.device.create_compute_pipelines(
                            vk::PipelineCache::null(),
                            &[pipeline_info],
                            None,
                        )
                    }
                    .map(|pipelines| pipelines[0])
                    .map_err(|(_, e)| {
                        BackendError::PipelineCreationFailed(format!("{}: {:?}", name, e))
                    })
                }
                None => Err(BackendError::PipelineCreationFailed(format!(
                    "{}: compute pipeline without a shader stage",
                    name
                ))),
            },
            (PipelineBindPoint::Graphics, Some(state)) => {
                self.create_graphics_pipeline(name, &stage_infos, state, layout)
            }
            (PipelineBindPoint::Graphics, None) => Err(BackendError::PipelineCreationFailed(
                format!("{}: graphics pipeline without fixed-function state", name),
            )),
        };

        self.destroy_shader_modules(&modules);
        result
    }

    fn create_graphics_pipeline(
        &self,
        name: &str,
        stages: &[vk::PipelineShaderStageCreateInfo<'_>],
        state: &crate::pipeline::GraphicsState,
        layout: vk::PipelineLayout,
    ) -> BackendResult<vk::Pipeline> {
        // Geometry is pulled from storage buffers, there is no vertex input.
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(if state.cull_back_faces {
                vk::CullModeFlags::BACK
            } else {
                vk::CullModeFlags::NONE
            })
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(state.depth_format.is_some())
            .depth_write_enable(state.depth_format.is_some() && state.depth_write)
            .depth_compare_op(convert_compare_op(state.depth_compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = state
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(false)
            })
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_attachment_formats: Vec<vk::Format> = state
            .color_formats
            .iter()
            .map(|format| convert_format(*format))
            .collect();
        let depth_attachment_format = state
            .depth_format
            .map(convert_format)
            .unwrap_or(vk::Format::UNDEFINED);
        let stencil_attachment_format = match state.depth_format {
            Some(format) if format.has_stencil() => convert_format(format),
            _ => vk::Format::UNDEFINED,
        };

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(depth_attachment_format)
            .stencil_attachment_format(stencil_attachment_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| BackendError::PipelineCreationFailed(format!("{}: {:?}", name, e)))?;

        Ok(pipelines[0])
    }

    fn destroy_shader_modules(&self, modules: &[vk::ShaderModule]) {
        for module in modules {
            unsafe { self.device.destroy_shader_module(*module, None) };
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle: {:?}", e);
            }
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);
        }
    }
}
