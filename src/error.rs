// src/error.rs
use thiserror::Error;

/// Errors surfaced by the loaders, the registry and the shape helpers.
///
/// Failures coming out of the serialization libraries are passed through
/// transparently rather than re-wrapped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid data_format: {0}")]
    InvalidDataFormat(String),

    #[error("unknown layer kind: {0}")]
    UnknownLayer(String),

    #[error("layer `{layer}` is missing required field `{field}`")]
    MissingField {
        layer: &'static str,
        field: &'static str,
    },

    #[error("layer `{layer}`: {reason}")]
    InvalidConfig {
        layer: &'static str,
        reason: String,
    },

    #[error("found {found} parameter tensors, model expects {expected}")]
    ParamCountMismatch { expected: usize, found: usize },

    #[error("container is missing `{0}` metadata")]
    MissingMetadata(&'static str),

    #[error("unsupported tensor dtype: {0:?}")]
    UnsupportedDtype(safetensors::Dtype),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    SafeTensor(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Checkpoint(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
