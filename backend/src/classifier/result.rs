use std::time::Duration;

use shared::{Label, PredictionResult};

use super::inference::ProbabilityVector;

/// Class index -> label, fixed by the trained output layer.
pub const CLASS_LABELS: [Label; 2] = [Label::Normal, Label::Pneumonia];

pub const NORMAL_DESCRIPTION: &str = "No signs of pneumonia detected. The X-ray appears normal.";
pub const PNEUMONIA_DESCRIPTION: &str = "Signs of pneumonia detected in the chest X-ray.";

pub fn description(label: Label) -> &'static str {
    match label {
        Label::Normal => NORMAL_DESCRIPTION,
        Label::Pneumonia => PNEUMONIA_DESCRIPTION,
    }
}

/// Index of the most probable class; exact ties resolve to index 0.
pub fn argmax(probabilities: &ProbabilityVector) -> usize {
    let [normal, pneumonia] = probabilities.as_array();
    if pneumonia > normal { 1 } else { 0 }
}

fn round_percentage(probability: f32) -> f64 {
    (f64::from(probability) * 100.0 * 100.0).round() / 100.0
}

pub fn format(probabilities: &ProbabilityVector, elapsed: Duration) -> PredictionResult {
    let index = argmax(probabilities);
    let label = CLASS_LABELS[index];

    PredictionResult {
        label,
        confidence: round_percentage(probabilities.get(index)),
        processing_time_ms: elapsed.as_millis() as u64,
        description: description(label).to_string(),
    }
}
