#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pneumoscan::classifier::{Classifier, InferenceError, Pipeline, PreprocessedTensor};

/// Returns the same logits for every input.
pub struct FixedLogits {
    logits: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedLogits {
    pub fn new(logits: &[f32]) -> Arc<Self> {
        Arc::new(Self {
            logits: logits.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedLogits {
    fn logits(&self, batch: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
        assert_eq!(batch.shape(), [1, 3, 224, 224]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.logits.clone())
    }

    fn device_name(&self) -> String {
        "Fixture".to_string()
    }
}

/// Simulates the device running out of memory.
pub struct OutOfMemory;

impl Classifier for OutOfMemory {
    fn logits(&self, _batch: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Device("CUDA out of memory".to_string()))
    }

    fn device_name(&self) -> String {
        "Cuda(0)".to_string()
    }
}

pub fn pipeline_with(model: Arc<dyn Classifier>) -> Pipeline {
    Pipeline::new(model)
}

/// A synthetic grayscale-ish radiograph encoded as PNG.
pub fn xray_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 7 + y * 3) % 256) as u8;
        Rgb([v, v, v])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}
