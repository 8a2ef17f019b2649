use tch::{Kind, Tensor};

use super::error::InferenceError;
use super::preprocess::PreprocessedTensor;

/// Anything that can score a preprocessed batch of one image.
///
/// Implementations are shared read-only across request threads and must
/// never mutate themselves during [`Classifier::logits`].
pub trait Classifier: Send + Sync {
    /// Raw class scores for the single image in `batch`, in class-index order.
    fn logits(&self, batch: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError>;

    fn device_name(&self) -> String;
}

/// Softmax output over the two classes, index 0 = NORMAL, 1 = PNEUMONIA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityVector([f32; 2]);

impl ProbabilityVector {
    pub fn from_logits(logits: &[f32]) -> Result<Self, InferenceError> {
        if logits.len() != 2 {
            return Err(InferenceError::UnexpectedOutput(logits.len()));
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite(logits.to_vec()));
        }

        let probs = Tensor::from_slice(logits).f_softmax(-1, Kind::Float)?;
        let probs = Vec::<f32>::try_from(&probs)?;
        match probs[..] {
            [normal, pneumonia] => Ok(Self([normal, pneumonia])),
            _ => Err(InferenceError::UnexpectedOutput(probs.len())),
        }
    }

    pub fn as_array(&self) -> [f32; 2] {
        self.0
    }

    pub fn get(&self, index: usize) -> f32 {
        self.0[index]
    }
}

/// Runs the forward pass and normalizes the logits into probabilities.
pub fn infer(
    model: &dyn Classifier,
    batch: &PreprocessedTensor,
) -> Result<ProbabilityVector, InferenceError> {
    let logits = model.logits(batch)?;
    log::trace!("Logits: {:?}", logits);
    ProbabilityVector::from_logits(&logits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_distribution(p: ProbabilityVector) {
        let [a, b] = p.as_array();
        assert!((0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b));
        assert!((a + b - 1.0).abs() < 1e-6, "{a} + {b} != 1");
    }

    #[test]
    fn softmax_of_known_logits() {
        let p = ProbabilityVector::from_logits(&[2.1, -0.3]).unwrap();
        assert!((p.get(0) - 0.916_827).abs() < 1e-5);
        assert_distribution(p);
    }

    #[test]
    fn equal_logits_split_evenly() {
        let p = ProbabilityVector::from_logits(&[0.7, 0.7]).unwrap();
        assert_eq!(p.get(0), p.get(1));
        assert_eq!(p.get(0), 0.5);
    }

    #[test]
    fn extreme_logits_stay_a_distribution() {
        for logits in [[1e4, -1e4], [-88.0, 88.0], [0.0, 0.0], [-3.5e3, -3.4e3]] {
            assert_distribution(ProbabilityVector::from_logits(&logits).unwrap());
        }
    }

    #[test]
    fn swapping_logits_swaps_probabilities() {
        let p = ProbabilityVector::from_logits(&[2.1, -0.3]).unwrap();
        let q = ProbabilityVector::from_logits(&[-0.3, 2.1]).unwrap();
        assert!((p.get(0) - q.get(1)).abs() < 1e-6);
        assert!((p.get(1) - q.get(0)).abs() < 1e-6);
        assert!((q.get(1) - 0.916_827).abs() < 1e-5);
    }

    #[test]
    fn rejects_wrong_width_and_non_finite_logits() {
        assert!(matches!(
            ProbabilityVector::from_logits(&[1.0, 2.0, 3.0]),
            Err(InferenceError::UnexpectedOutput(3))
        ));
        assert!(matches!(
            ProbabilityVector::from_logits(&[f32::NAN, 0.0]),
            Err(InferenceError::NonFinite(_))
        ));
    }
}
