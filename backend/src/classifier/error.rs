use std::path::PathBuf;

/// Startup-fatal: the server must not come up without a valid model.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactLoadError {
    #[error("Weights file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read weights from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: tch::TchError,
    },
    #[error("Parameter '{0}' is missing from the weights file")]
    MissingParameter(String),
    #[error("Weights file contains unexpected parameter '{0}'")]
    UnexpectedParameter(String),
    #[error("Shape mismatch for '{name}': architecture expects {expected:?}, file has {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Failed to copy parameter '{name}': {source}")]
    Copy {
        name: String,
        #[source]
        source: tch::TchError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty image payload")]
    Empty,
    #[error("Could not decode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Device error during forward pass: {0}")]
    Device(String),
    #[error("Model returned {0} logits, expected 2")]
    UnexpectedOutput(usize),
    #[error("Model returned non-finite logits: {0:?}")]
    NonFinite(Vec<f32>),
}

impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Device(err.to_string())
    }
}

/// Per-request failure of [`super::Pipeline::classify`].
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
