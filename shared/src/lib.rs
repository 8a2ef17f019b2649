use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Normal,
    Pneumonia,
}

/// Outcome of classifying one chest X-ray.
///
/// These four fields are the whole response contract; adapters must not add
/// to them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    /// Percentage in [0, 100], rounded to two decimals.
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn label_uses_uppercase_names() {
        assert_eq!(Label::Normal.to_string(), "NORMAL");
        assert_eq!(Label::from_str("PNEUMONIA").unwrap(), Label::Pneumonia);
        assert_eq!(
            serde_json::to_string(&Label::Pneumonia).unwrap(),
            "\"PNEUMONIA\""
        );
    }

    #[test]
    fn prediction_serializes_contract_fields_only() {
        let result = PredictionResult {
            label: Label::Normal,
            confidence: 91.68,
            processing_time_ms: 12,
            description: "No signs of pneumonia detected. The X-ray appears normal.".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["label"], "NORMAL");
        assert_eq!(object["confidence"], 91.68);
        assert_eq!(object["processing_time_ms"], 12);
    }
}
