//! Per-camera culling buffers and hierarchical Z-buffer

use crate::backend::{
    AddressMode, BufferUsage, Filter, Format, ImageUsage, MemoryUsage, MipmapMode,
};
use crate::context::GraphicsContext;
use crate::error::{RendererError, RendererResult};
use crate::gpu_scene::DrawIndexedIndirectCommand;
use crate::resources::{
    BufferCreation, BufferHandle, GpuResources, ImageCreation, ImageHandle, SamplerCreation,
    SamplerHandle,
};
use crate::scene::CameraResource;

use super::hzb::{hzb_border_color, hzb_mip_count, hzb_reduction, hzb_size};

/// Output buffers of culling one geometry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    /// Compacted draw commands, written by the culling shader
    pub draw_buffer: BufferHandle,
    /// Live draw count followed by the instance index of every compacted draw
    pub redirect_buffer: BufferHandle,
    /// One bit per draw, set when the draw passed the prepass
    pub visibility_buffer: BufferHandle,
    pub capacity: u32,
}

impl DrawBatch {
    fn new(context: &mut GraphicsContext, name: &str, capacity: u32) -> RendererResult<Self> {
        let draw_buffer = context.create_buffer(
            &BufferCreation::new(
                std::mem::size_of::<DrawIndexedIndirectCommand>() as u64 * capacity as u64,
            )
            .with_usage(BufferUsage::STORAGE | BufferUsage::INDIRECT)
            .with_memory(MemoryUsage::GpuOnly)
            .with_name(format!("{name} Draw Buffer")),
        )?;
        let redirect_buffer = context.create_buffer(
            &BufferCreation::new(4 + 4 * capacity as u64)
                .with_usage(BufferUsage::STORAGE | BufferUsage::TRANSFER_DST | BufferUsage::INDIRECT)
                .with_memory(MemoryUsage::GpuOnly)
                .with_name(format!("{name} Redirect Buffer")),
        )?;
        let visibility_buffer = context.create_buffer(
            &BufferCreation::new(capacity as u64 / 8)
                .with_usage(BufferUsage::STORAGE)
                .with_memory(MemoryUsage::GpuOnly)
                .with_name(format!("{name} Visibility Buffer")),
        )?;

        Ok(Self {
            draw_buffer,
            redirect_buffer,
            visibility_buffer,
            capacity,
        })
    }

    fn destroy(&self, resources: &mut GpuResources) {
        resources.buffers.destroy(self.draw_buffer);
        resources.buffers.destroy(self.redirect_buffer);
        resources.buffers.destroy(self.visibility_buffer);
    }
}

/// Everything one camera needs for two-pass occlusion culling: a draw batch
/// per geometry class, the depth buffer it renders to and the HZB built from
/// that depth.
///
/// The camera's uniform buffers are referenced by handle; the
/// [`CameraResource`] owning them must outlive the batch.
#[derive(Debug)]
pub struct CameraBatch {
    name: String,
    static_draw: DrawBatch,
    skinned_draw: DrawBatch,
    depth_image: ImageHandle,
    hzb_image: ImageHandle,
    hzb_sampler: SamplerHandle,
    hzb_size: u32,
    camera_buffers: Vec<BufferHandle>,
    reverse_z: bool,
}

impl CameraBatch {
    pub fn new(
        context: &mut GraphicsContext,
        name: &str,
        camera: &CameraResource,
        depth_image: ImageHandle,
    ) -> RendererResult<Self> {
        let depth = context
            .resources()
            .images
            .get(depth_image)
            .ok_or(RendererError::InvalidHandle { kind: "image" })?;
        let size = hzb_size(depth.width, depth.height);
        let mips = hzb_mip_count(size);

        let config = context.config().clone();
        let reverse_z = config.reverse_z;

        let static_draw = DrawBatch::new(context, &format!("Static {name}"), config.max_static_instances)?;
        let skinned_draw =
            DrawBatch::new(context, &format!("Skinned {name}"), config.max_skinned_instances)?;

        let hzb_sampler = context.create_sampler(
            &SamplerCreation::new()
                .with_filters(Filter::Linear, Filter::Linear)
                .with_mipmap_mode(MipmapMode::Nearest)
                .with_anisotropy(false)
                .with_global_address_mode(AddressMode::ClampToBorder)
                .with_border_color(hzb_border_color(reverse_z))
                .with_lod(0.0, (size as f32).log2().floor())
                .with_reduction_mode(hzb_reduction(reverse_z))
                .with_name(format!("{name} HZB Sampler")),
        )?;
        let hzb_image = context.create_image(
            &ImageCreation::new()
                .with_size(size, size)
                .with_mips(mips)
                .with_format(Format::R32Sfloat)
                .with_usage(ImageUsage::STORAGE | ImageUsage::SAMPLED)
                .with_sampler(hzb_sampler)
                .with_name(format!("{name} HZB Image")),
        )?;

        log::debug!("Created camera batch '{name}' with a {size}x{size} HZB ({mips} mips)");

        Ok(Self {
            name: name.to_string(),
            static_draw,
            skinned_draw,
            depth_image,
            hzb_image,
            hzb_sampler,
            hzb_size: size,
            camera_buffers: camera.buffers().to_vec(),
            reverse_z,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn static_draw(&self) -> &DrawBatch {
        &self.static_draw
    }

    pub fn skinned_draw(&self) -> &DrawBatch {
        &self.skinned_draw
    }

    /// Both draw batches, static first.
    pub fn draw_batches(&self) -> [&DrawBatch; 2] {
        [&self.static_draw, &self.skinned_draw]
    }

    pub fn depth_image(&self) -> ImageHandle {
        self.depth_image
    }

    pub fn hzb_image(&self) -> ImageHandle {
        self.hzb_image
    }

    pub fn hzb_sampler(&self) -> SamplerHandle {
        self.hzb_sampler
    }

    /// Edge of the square HZB in texels.
    pub fn hzb_size(&self) -> u32 {
        self.hzb_size
    }

    /// Camera uniform buffer of `current_frame`.
    pub fn camera_buffer(&self, current_frame: u32) -> BufferHandle {
        self.camera_buffers[current_frame as usize % self.camera_buffers.len()]
    }

    pub fn reverse_z(&self) -> bool {
        self.reverse_z
    }

    /// Release the buffers, HZB image and sampler. The depth image and the
    /// camera buffers belong to their owners.
    pub fn destroy(self, resources: &mut GpuResources) {
        self.static_draw.destroy(resources);
        self.skinned_draw.destroy(resources);
        resources.images.destroy(self.hzb_image);
        resources.samplers.destroy(self.hzb_sampler);
    }
}
