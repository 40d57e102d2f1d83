//! RedLilium renderer core - a GPU-driven renderer built around a frame graph
//!
//! The renderer is organized in three layers:
//! - **Resources**: images, buffers, samplers, materials and meshes pooled in
//!   resource managers and addressed through generation-checked handles
//! - **Frame graph**: passes declare what they read and write; the graph
//!   orders them and derives every layout transition and memory barrier
//! - **Culling**: two-pass GPU occlusion culling against a hierarchical
//!   Z-buffer, feeding indirect draws
//!
//! Two backends are available:
//! - **dummy**: records commands instead of executing them, for headless runs
//!   and tests
//! - **Vulkan**: native Vulkan through ash (`vulkan-backend` feature)
//!
//! Scene data is gathered from a Bevy ECS [`World`].

pub mod backend;
pub mod config;
pub mod context;
pub mod culling;
pub mod error;
pub mod frame_graph;
pub mod gpu_scene;
pub mod pipeline;
pub mod resources;
pub mod scene;

// Re-export Bevy ECS prelude for users
pub use bevy_ecs::prelude::*;

pub use config::RendererConfig;
pub use context::GraphicsContext;
pub use error::{RendererError, RendererResult};
pub use frame_graph::FrameGraph;
pub use gpu_scene::GpuScene;

/// Crate version, as reported in logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the renderer version. Call once after installing a logger.
pub fn init() {
    log::info!("RedLilium renderer v{VERSION}");
}
