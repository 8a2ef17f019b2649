use std::sync::Arc;
use std::time::Instant;

use shared::PredictionResult;

use super::error::ClassifyError;
use super::inference::{Classifier, infer};
use super::preprocess::preprocess;
use super::result::format;

/// Decode -> preprocess -> forward pass -> formatted result.
#[derive(Clone)]
pub struct Pipeline {
    model: Arc<dyn Classifier>,
}

impl Pipeline {
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        Self { model }
    }

    pub fn device_name(&self) -> String {
        self.model.device_name()
    }

    /// Classifies one encoded image.
    ///
    /// The reported latency covers decoding, preprocessing and the forward
    /// pass but not formatting. Errors are returned as-is; nothing is retried.
    pub fn classify(&self, image: &[u8]) -> Result<PredictionResult, ClassifyError> {
        let start = Instant::now();

        let batch = preprocess(image)?;
        let probabilities = infer(self.model.as_ref(), &batch)?;
        let elapsed = start.elapsed();

        let result = format(&probabilities, elapsed);
        log::debug!(
            "Classified {} bytes as {} ({:.2}%) in {} ms",
            image.len(),
            result.label,
            result.confidence,
            result.processing_time_ms
        );
        Ok(result)
    }
}
