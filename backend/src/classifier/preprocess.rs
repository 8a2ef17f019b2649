use std::borrow::Cow;

use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayView4};

use super::error::DecodeError;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;
/// Per-channel (R, G, B) mean of the data the backbone was pretrained on.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel (R, G, B) standard deviation matching [`IMAGENET_MEAN`].
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized NCHW batch of one image, held in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor(Array4<f32>);

impl PreprocessedTensor {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.0.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    /// NCHW values in row-major order. Borrowed when the array is already
    /// contiguous, copied otherwise.
    pub fn to_contiguous(&self) -> Cow<'_, [f32]> {
        match self.0.as_slice() {
            Some(values) => Cow::Borrowed(values),
            None => Cow::Owned(self.0.iter().copied().collect()),
        }
    }
}

/// Decodes `bytes` and turns the image into the model's input batch.
pub fn preprocess(bytes: &[u8]) -> Result<PreprocessedTensor, DecodeError> {
    let image = decode(bytes)?;
    Ok(normalize(&resize(&image)))
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Drops alpha, expands grayscale and stretches to `INPUT_SIZE` square.
/// Aspect ratio is deliberately not kept: the model was trained on stretched inputs.
pub fn resize(image: &DynamicImage) -> RgbImage {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8()
}

pub fn normalize(rgb: &RgbImage) -> PreprocessedTensor {
    let (width, height) = rgb.dimensions();
    let mut batch = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            batch[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    PreprocessedTensor(batch)
}
