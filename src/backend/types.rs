//! Common types shared between backends

use bitflags::bitflags;
use glam::Vec3;

/// Image format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Undefined,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgba16Sfloat,
    Rgba32Sfloat,
    R32Sfloat,
    Rg16Sfloat,
    D16Unorm,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl Format {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D32Sfloat | Format::D24UnormS8Uint | Format::D32SfloatS8Uint
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::D16Unorm => 2,
            Format::Rgba8Unorm
            | Format::Rgba8Srgb
            | Format::Bgra8Unorm
            | Format::Bgra8Srgb
            | Format::R32Sfloat
            | Format::Rg16Sfloat
            | Format::D32Sfloat
            | Format::D24UnormS8Uint => 4,
            Format::Rgba16Sfloat | Format::D32SfloatS8Uint => 8,
            Format::Rgba32Sfloat => 16,
        }
    }

    /// Aspect affected by barriers and views of an image in this format.
    pub fn aspect(&self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }
}

bitflags! {
    /// Image usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

/// Where the memory backing a buffer lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

bitflags! {
    /// Pipeline stages, mirroring the synchronization2 stage bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u64 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const ALL_GRAPHICS = 1 << 11;
        const ALL_COMMANDS = 1 << 12;
    }
}

bitflags! {
    /// Memory access masks, mirroring the synchronization2 access bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u64 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const UNIFORM_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const MEMORY_READ = 1 << 11;
        const MEMORY_WRITE = 1 << 12;
    }
}

bitflags! {
    /// Image aspects covered by a view or barrier
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Shader stages a binding or push constant range is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// Image layouts an image moves through during a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

/// Stage and access pair describing one side of a layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutTransitionState {
    pub stages: PipelineStages,
    pub access: AccessFlags,
}

impl ImageLayout {
    /// Stage/access that last touched an image in this layout.
    pub fn source_state(self) -> LayoutTransitionState {
        let (stages, access) = match self {
            Self::Undefined => (PipelineStages::TOP_OF_PIPE, AccessFlags::empty()),
            Self::General => (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE),
            Self::ColorAttachmentOptimal => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            Self::DepthStencilAttachmentOptimal => (
                PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            Self::DepthStencilReadOnlyOptimal => (
                PipelineStages::EARLY_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            ),
            Self::ShaderReadOnlyOptimal => {
                (PipelineStages::FRAGMENT_SHADER, AccessFlags::SHADER_READ)
            }
            Self::TransferSrcOptimal | Self::TransferDstOptimal => {
                (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE)
            }
            Self::PresentSrc => (PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty()),
        };
        LayoutTransitionState { stages, access }
    }

    /// Stage/access that will next use an image in this layout.
    pub fn destination_state(self) -> LayoutTransitionState {
        let (stages, access) = match self {
            Self::Undefined => (PipelineStages::TOP_OF_PIPE, AccessFlags::empty()),
            Self::General => (
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            ),
            Self::ColorAttachmentOptimal => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            Self::DepthStencilAttachmentOptimal => (
                PipelineStages::EARLY_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            Self::DepthStencilReadOnlyOptimal => (
                PipelineStages::EARLY_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            ),
            Self::ShaderReadOnlyOptimal => {
                (PipelineStages::FRAGMENT_SHADER, AccessFlags::SHADER_READ)
            }
            Self::TransferSrcOptimal => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_READ),
            Self::TransferDstOptimal => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
            Self::PresentSrc => (PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty()),
        };
        LayoutTransitionState { stages, access }
    }
}

/// Kind of image and the views created for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageType {
    #[default]
    D2,
    Cubemap,
    D3,
}

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Filtering between mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Border color for `ClampToBorder` addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    FloatTransparentBlack,
    FloatOpaqueBlack,
    FloatOpaqueWhite,
    #[default]
    IntOpaqueBlack,
}

/// How a sampler combines the texels of its footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReductionMode {
    #[default]
    WeightedAverage,
    Min,
    Max,
}

/// Comparison function for depth sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    #[default]
    Always,
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    Uint16,
    #[default]
    Uint32,
}

/// Descriptor kinds used by the pipelines of this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
}

/// One binding inside a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
}

impl DescriptorBinding {
    pub fn new(binding: u32, ty: DescriptorType, stages: ShaderStages) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
        }
    }
}

/// Pipeline bind point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport with the standard `[0, 1]` depth range.
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub extent: Extent2D,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, extent }
    }
}

/// Debug label color (RGB, alpha is always 1)
pub type LabelColor = Vec3;
