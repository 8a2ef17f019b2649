//! Chest X-ray classification core.
//!
//! Everything here is independent of HTTP: adapters hand raw upload bytes to
//! [`Pipeline::classify`] and map the returned errors themselves.

pub mod error;
pub mod inference;
pub mod loader;
pub mod pipeline;
pub mod preprocess;
pub mod resnet;
pub mod result;

pub use error::{ArtifactLoadError, ClassifyError, DecodeError, InferenceError};
pub use inference::{Classifier, ProbabilityVector, infer};
pub use loader::{DeviceSpec, ModelHandle};
pub use pipeline::Pipeline;
pub use preprocess::{PreprocessedTensor, preprocess};
