use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Prediction as produced by a detector backend, before validation.
///
/// `bbox` is `[x, y, width, height]` in pixel coordinates of the source frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPrediction {
    pub class: String,
    pub score: f32,
    pub bbox: [f32; 4],
}

/// Largest coordinate magnitude accepted from a backend, in pixels.
pub const MAX_COORDINATE: f32 = 1.0e6;

/// Axis-aligned box in source-frame pixels.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.as_array()
    }
}

/// One labeled box with an integer confidence percentage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Rounded percentage, always within `0..=100`.
    pub confidence: u8,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Validate a backend prediction and normalize it into a `Detection`.
    pub fn from_raw(raw: &RawPrediction) -> Result<Self> {
        let label = raw.class.trim();
        if label.is_empty() {
            return Err(anyhow!("prediction has an empty class label"));
        }
        if !raw.score.is_finite() {
            return Err(anyhow!("prediction '{}' has non-finite score", label));
        }
        let [x, y, width, height] = raw.bbox;
        if raw.bbox.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("prediction '{}' has non-finite bbox", label));
        }
        if raw.bbox.iter().any(|v| v.abs() > MAX_COORDINATE) {
            return Err(anyhow!(
                "prediction '{}' has bbox {:?} outside ±{}",
                label,
                raw.bbox,
                MAX_COORDINATE
            ));
        }
        if width < 0.0 || height < 0.0 {
            return Err(anyhow!(
                "prediction '{}' has negative bbox size {}x{}",
                label,
                width,
                height
            ));
        }

        Ok(Self {
            label: label.to_string(),
            confidence: score_to_percent(raw.score),
            bbox: BoundingBox::new(x, y, width, height),
        })
    }

    /// Tag text drawn above the box, e.g. `cat (87%)`.
    pub fn label_text(&self) -> String {
        format!("{} ({}%)", self.label, self.confidence)
    }
}

/// Convert a `0..1` score into a rounded percentage.
///
/// Rounds half up. Out-of-range scores are clamped.
pub fn score_to_percent(score: f32) -> u8 {
    let percent = (f64::from(score) * 100.0 + 0.5).floor();
    percent.clamp(0.0, 100.0) as u8
}

/// Map backend output into detections, dropping entries that fail validation.
pub fn map_predictions(raw: &[RawPrediction]) -> Vec<Detection> {
    raw.iter()
        .filter_map(|prediction| match Detection::from_raw(prediction) {
            Ok(detection) => Some(detection),
            Err(err) => {
                log::warn!("dropping invalid prediction: {}", err);
                None
            }
        })
        .collect()
}

/// Rounded mean of per-detection confidences; 0 for an empty list.
pub fn average_confidence(detections: &[Detection]) -> u8 {
    if detections.is_empty() {
        return 0;
    }
    let n = detections.len() as u64;
    let sum: u64 = detections.iter().map(|d| u64::from(d.confidence)).sum();
    // round(sum / n) with half-up, in integers
    ((2 * sum + n) / (2 * n)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class: &str, score: f32) -> RawPrediction {
        RawPrediction {
            class: class.to_string(),
            score,
            bbox: [10.0, 20.0, 100.0, 80.0],
        }
    }

    fn det(confidence: u8) -> Detection {
        Detection {
            label: "x".to_string(),
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn maps_cat_prediction() {
        let detection = Detection::from_raw(&raw("cat", 0.873)).unwrap();
        assert_eq!(detection.label, "cat");
        assert_eq!(detection.confidence, 87);
        assert_eq!(detection.bbox.as_array(), [10.0, 20.0, 100.0, 80.0]);
        assert_eq!(detection.label_text(), "cat (87%)");
    }

    #[test]
    fn percent_rounding_matches_score_times_hundred() {
        assert_eq!(score_to_percent(0.0), 0);
        assert_eq!(score_to_percent(1.0), 100);
        assert_eq!(score_to_percent(0.5), 50);
        assert_eq!(score_to_percent(0.994), 99);
        assert_eq!(score_to_percent(0.996), 100);
        assert_eq!(score_to_percent(0.125), 13);
        for i in 0..=1000 {
            let score = i as f32 / 1000.0;
            let percent = score_to_percent(score);
            assert!(percent <= 100);
            let expected = (f64::from(score) * 100.0).round() as i64;
            assert_eq!(i64::from(percent), expected, "score {}", score);
        }
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(score_to_percent(1.7), 100);
        assert_eq!(score_to_percent(-0.2), 0);
    }

    #[test]
    fn rejects_malformed_predictions() {
        assert!(Detection::from_raw(&raw("", 0.5)).is_err());
        assert!(Detection::from_raw(&raw("cat", f32::NAN)).is_err());
        let mut bad_box = raw("cat", 0.5);
        bad_box.bbox = [0.0, 0.0, -4.0, 3.0];
        assert!(Detection::from_raw(&bad_box).is_err());
        bad_box.bbox = [f32::INFINITY, 0.0, 4.0, 3.0];
        assert!(Detection::from_raw(&bad_box).is_err());
    }

    #[test]
    fn rejects_coordinates_beyond_pixel_range() {
        let mut huge = raw("cat", 0.5);
        huge.bbox = [10.0, -3.0e9, 20.0, 20.0];
        assert!(Detection::from_raw(&huge).is_err());
        huge.bbox = [2.0e9, 10.0, 1.0e9, 20.0];
        assert!(Detection::from_raw(&huge).is_err());
        huge.bbox = [-MAX_COORDINATE, 0.0, MAX_COORDINATE, 1.0];
        assert!(Detection::from_raw(&huge).is_ok());
    }

    #[test]
    fn bbox_serializes_as_array() {
        let json = serde_json::to_value(det(87)).unwrap();
        assert_eq!(json["bbox"], serde_json::json!([0.0, 0.0, 1.0, 1.0]));
        let back: Detection = serde_json::from_value(json).unwrap();
        assert_eq!(back, det(87));
        assert!(serde_json::from_str::<BoundingBox>(r#"{"x":1.0,"y":2.0,"width":3.0,"height":4.0}"#).is_err());
    }

    #[test]
    fn map_predictions_drops_invalid_entries() {
        let detections = map_predictions(&[raw("dog", 0.91), raw("", 0.4), raw("cup", 0.55)]);
        let labels: Vec<_> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["dog", "cup"]);
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average_confidence(&[]), 0);
    }

    #[test]
    fn average_is_rounded_mean() {
        assert_eq!(average_confidence(&[det(87)]), 87);
        assert_eq!(average_confidence(&[det(80), det(91)]), 86);
        assert_eq!(average_confidence(&[det(50), det(51), det(51)]), 51);
        assert_eq!(average_confidence(&[det(10), det(11)]), 11);
        assert_eq!(average_confidence(&[det(100), det(100), det(100)]), 100);
    }
}
