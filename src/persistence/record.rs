use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;

/// Payload of a save request: what was on screen when the user hit save.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDetectionRecord {
    pub detection_data: Vec<Detection>,
    /// JPEG snapshot of the rendered canvas as a `data:` URL.
    pub image_url: String,
    /// Average confidence percentage at capture time.
    pub confidence: u8,
}

/// A saved snapshot as returned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub id: i64,
    pub user_id: String,
    pub detection_data: Vec<Detection>,
    pub image_url: String,
    pub confidence: u8,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl DetectionRecord {
    pub fn object_count(&self) -> usize {
        self.detection_data.len()
    }

    /// One history line: object count and creation time.
    pub fn summary(&self) -> String {
        format!(
            "#{} {} objects, {}% avg, {}",
            self.id,
            self.object_count(),
            self.confidence,
            format_utc(self.created_at)
        )
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render epoch milliseconds as `YYYY-MM-DD HH:MM:SS UTC`.
///
/// Timestamps outside chrono's range fall back to the raw millisecond value.
pub fn format_utc(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{} ms", epoch_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = NewDetectionRecord {
            detection_data: vec![Detection {
                label: "cat".to_string(),
                confidence: 87,
                bbox: BoundingBox::new(10.0, 20.0, 100.0, 80.0),
            }],
            image_url: "data:image/jpeg;base64,AAAA".to_string(),
            confidence: 87,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["detectionData"][0]["label"], "cat");
        assert_eq!(
            json["detectionData"][0]["bbox"],
            serde_json::json!([10.0, 20.0, 100.0, 80.0])
        );
        assert_eq!(json["imageUrl"], "data:image/jpeg;base64,AAAA");
        assert_eq!(json["confidence"], 87);
    }

    #[test]
    fn formats_utc_timestamps() {
        assert_eq!(format_utc(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_utc(951_782_400_000), "2000-02-29 00:00:00 UTC");
        assert_eq!(format_utc(1_700_000_000_123), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_utc(-1_000), "1969-12-31 23:59:59 UTC");
        assert_eq!(format_utc(i64::MAX), format!("{} ms", i64::MAX));
    }
}
