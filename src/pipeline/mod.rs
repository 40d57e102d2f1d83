//! Pipeline building.
//!
//! Pipelines are built from SPIR-V and explicit binding declarations.
//! Descriptor set layouts are deduplicated through a
//! [`DescriptorSetLayoutCache`] owned by the
//! [`GraphicsContext`](crate::GraphicsContext), so passes declaring identical
//! bindings share one layout object for the lifetime of the context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{
    Backend, BackendError, CompareOp, DescriptorBinding, Format, GpuDescriptorSetLayout,
    GpuPipeline, PipelineBindPoint, ShaderStages,
};
use crate::context::GraphicsContext;
use crate::error::RendererResult;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a little-endian SPIR-V binary.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, BackendError> {
    if bytes.len() % 4 != 0 {
        return Err(BackendError::ShaderCreationFailed(format!(
            "SPIR-V size {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    validate_spirv(&words)?;
    Ok(words)
}

/// Load a compiled shader from disk.
pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>, BackendError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        BackendError::ShaderCreationFailed(format!("failed to read {}: {}", path.display(), e))
    })?;
    spirv_from_bytes(&bytes)
}

fn validate_spirv(words: &[u32]) -> Result<(), BackendError> {
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(()),
        Some(word) => Err(BackendError::ShaderCreationFailed(format!(
            "invalid SPIR-V magic number {word:#010x}"
        ))),
        None => Err(BackendError::ShaderCreationFailed("empty SPIR-V module".into())),
    }
}

/// A descriptor set layout shared through the cache.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    bindings: Vec<DescriptorBinding>,
    push_descriptor: bool,
    gpu: GpuDescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn is_push_descriptor(&self) -> bool {
        self.push_descriptor
    }

    pub fn gpu(&self) -> &GpuDescriptorSetLayout {
        &self.gpu
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    bindings: Vec<DescriptorBinding>,
    push_descriptor: bool,
}

/// Deduplicates descriptor set layouts by the structure of their bindings.
///
/// Binding order does not matter: lists are keyed by binding index.
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutCache {
    layouts: HashMap<LayoutKey, Arc<DescriptorSetLayout>>,
}

impl DescriptorSetLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        backend: &Backend,
        bindings: &[DescriptorBinding],
        push_descriptor: bool,
    ) -> RendererResult<Arc<DescriptorSetLayout>> {
        let mut sorted = bindings.to_vec();
        sorted.sort_by_key(|binding| binding.binding);
        let key = LayoutKey {
            bindings: sorted,
            push_descriptor,
        };

        if let Some(layout) = self.layouts.get(&key) {
            return Ok(layout.clone());
        }

        let gpu = backend.create_descriptor_set_layout(&key.bindings, push_descriptor)?;
        let layout = Arc::new(DescriptorSetLayout {
            bindings: key.bindings.clone(),
            push_descriptor,
            gpu,
        });
        log::debug!(
            "Cached descriptor set layout #{} ({} bindings)",
            self.layouts.len(),
            layout.bindings.len()
        );
        self.layouts.insert(key, layout.clone());
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Drop the cache's references. Layouts still held by pipelines stay alive.
    pub fn clear(&mut self) {
        self.layouts.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDescriptor<'a> {
    pub stage: ShaderStages,
    pub spirv: &'a [u32],
    pub entry_point: &'a str,
}

/// Fixed-function state of a graphics pipeline using dynamic rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub cull_back_faces: bool,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            color_formats: Vec::new(),
            depth_format: None,
            depth_write: true,
            depth_compare: CompareOp::GreaterOrEqual,
            cull_back_faces: true,
        }
    }
}

/// Everything a backend needs to create a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    pub name: &'a str,
    pub bind_point: PipelineBindPoint,
    pub stages: &'a [ShaderStageDescriptor<'a>],
    pub set_layouts: &'a [Arc<DescriptorSetLayout>],
    pub push_constants: &'a [PushConstantRange],
    pub graphics: Option<&'a GraphicsState>,
}

/// A compiled pipeline with its layout.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    bind_point: PipelineBindPoint,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    push_constants: Vec<PushConstantRange>,
    gpu: GpuPipeline,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    pub fn push_constants(&self) -> &[PushConstantRange] {
        &self.push_constants
    }

    pub fn gpu(&self) -> &GpuPipeline {
        &self.gpu
    }

    fn create(
        context: &GraphicsContext,
        name: &str,
        bind_point: PipelineBindPoint,
        stages: &[ShaderStageDescriptor<'_>],
        set_layouts: Vec<Arc<DescriptorSetLayout>>,
        push_constants: Vec<PushConstantRange>,
        graphics: Option<&GraphicsState>,
    ) -> RendererResult<Self> {
        for stage in stages {
            validate_spirv(stage.spirv)?;
        }

        let gpu = context.backend().create_pipeline(&PipelineDescriptor {
            name,
            bind_point,
            stages,
            set_layouts: &set_layouts,
            push_constants: &push_constants,
            graphics,
        })?;

        Ok(Self {
            name: name.to_string(),
            bind_point,
            set_layouts,
            push_constants,
            gpu,
        })
    }
}

/// Builds a compute pipeline with one push-descriptor set.
#[derive(Debug, Clone)]
pub struct ComputePipelineBuilder {
    name: String,
    spirv: Vec<u32>,
    entry_point: String,
    bindings: Vec<DescriptorBinding>,
    push_constant_size: u32,
}

impl ComputePipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spirv: Vec::new(),
            entry_point: "main".to_string(),
            bindings: Vec::new(),
            push_constant_size: 0,
        }
    }

    pub fn with_shader(mut self, spirv: Vec<u32>) -> Self {
        self.spirv = spirv;
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Bindings of descriptor set 0, updated with push descriptors.
    pub fn with_bindings(mut self, bindings: &[DescriptorBinding]) -> Self {
        self.bindings = bindings.to_vec();
        self
    }

    pub fn with_push_constants(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    pub fn build(self, context: &mut GraphicsContext) -> RendererResult<Pipeline> {
        let set_layouts = if self.bindings.is_empty() {
            Vec::new()
        } else {
            vec![context.descriptor_set_layout(&self.bindings, true)?]
        };
        let push_constants = (self.push_constant_size > 0)
            .then_some(PushConstantRange {
                stages: ShaderStages::COMPUTE,
                offset: 0,
                size: self.push_constant_size,
            })
            .into_iter()
            .collect();

        let stages = [ShaderStageDescriptor {
            stage: ShaderStages::COMPUTE,
            spirv: &self.spirv,
            entry_point: &self.entry_point,
        }];
        Pipeline::create(
            context,
            &self.name,
            PipelineBindPoint::Compute,
            &stages,
            set_layouts,
            push_constants,
            None,
        )
    }
}

/// Builds a vertex + fragment pipeline for dynamic rendering.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuilder {
    name: String,
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    bindings: Vec<DescriptorBinding>,
    push_constants: Option<PushConstantRange>,
    state: GraphicsState,
}

impl GraphicsPipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex_spirv: Vec::new(),
            fragment_spirv: Vec::new(),
            bindings: Vec::new(),
            push_constants: None,
            state: GraphicsState::default(),
        }
    }

    pub fn with_vertex_shader(mut self, spirv: Vec<u32>) -> Self {
        self.vertex_spirv = spirv;
        self
    }

    pub fn with_fragment_shader(mut self, spirv: Vec<u32>) -> Self {
        self.fragment_spirv = spirv;
        self
    }

    pub fn with_bindings(mut self, bindings: &[DescriptorBinding]) -> Self {
        self.bindings = bindings.to_vec();
        self
    }

    pub fn with_push_constants(mut self, stages: ShaderStages, size: u32) -> Self {
        self.push_constants = Some(PushConstantRange {
            stages,
            offset: 0,
            size,
        });
        self
    }

    pub fn with_color_formats(mut self, formats: &[Format]) -> Self {
        self.state.color_formats = formats.to_vec();
        self
    }

    pub fn with_depth(mut self, format: Format, compare: CompareOp, write: bool) -> Self {
        self.state.depth_format = Some(format);
        self.state.depth_compare = compare;
        self.state.depth_write = write;
        self
    }

    pub fn with_cull_back_faces(mut self, cull: bool) -> Self {
        self.state.cull_back_faces = cull;
        self
    }

    pub fn build(self, context: &mut GraphicsContext) -> RendererResult<Pipeline> {
        let set_layouts = if self.bindings.is_empty() {
            Vec::new()
        } else {
            vec![context.descriptor_set_layout(&self.bindings, true)?]
        };

        let stages = [
            ShaderStageDescriptor {
                stage: ShaderStages::VERTEX,
                spirv: &self.vertex_spirv,
                entry_point: "main",
            },
            ShaderStageDescriptor {
                stage: ShaderStages::FRAGMENT,
                spirv: &self.fragment_spirv,
                entry_point: "main",
            },
        ];
        Pipeline::create(
            context,
            &self.name,
            PipelineBindPoint::Graphics,
            &stages,
            set_layouts,
            self.push_constants.into_iter().collect(),
            Some(&self.state),
        )
    }
}
