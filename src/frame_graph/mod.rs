//! Frame Graph
//!
//! Passes declare the images and buffers they read and write. The graph
//! matches inputs to producers by the GPU object's name, orders the passes
//! so that producers run first and derives the layout transitions and memory
//! barriers each pass needs. Building is done once per topology change;
//! recording replays the precomputed result every frame.

mod graph;
mod node;
mod resource;

pub use graph::*;
pub use node::*;
pub use resource::*;
