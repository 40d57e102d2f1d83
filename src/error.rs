//! Renderer error types.
//!
//! Every variant except [`RendererError::Backend`] describes an authoring or
//! configuration mistake. They are reported as values so callers can surface
//! them, but the renderer never tries to recover from them.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors produced by the renderer core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
    #[error(
        "Multiple nodes produce resource '{resource}' ('{first}' and '{second}'). \
         Use the Reference resource type to depend on a resource without producing it"
    )]
    DuplicateProducer {
        resource: String,
        first: String,
        second: String,
    },
    #[error("Requested resource '{resource}' of node '{consumer}' is not produced by any node")]
    MissingProducer { resource: String, consumer: String },
    #[error("Unsupported frame graph resource type for '{resource}'")]
    UnsupportedResourceType { resource: String },
    #[error("Invalid {kind} handle")]
    InvalidHandle { kind: &'static str },
    #[error("Capacity of {what} exceeded: {requested} requested, {capacity} available")]
    CapacityExceeded {
        what: &'static str,
        capacity: usize,
        requested: usize,
    },
    #[error("Invalid renderer configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type RendererResult<T> = Result<T, RendererError>;
