use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::prediction::RawPrediction;
use crate::frame::Frame;

const DEFAULT_LUMA_THRESHOLD: u8 = 200;
const SAMPLE_STEP: u32 = 2;

/// Stub backend for demos and tests.
///
/// Reports the bounding box of bright pixels as a single prediction. Paired with
/// the synthetic camera, this tracks the moving square without any model file.
pub struct StubBackend {
    label: String,
    threshold: u8,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            label: "object".to_string(),
            threshold: DEFAULT_LUMA_THRESHOLD,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawPrediction>> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut bright = 0u64;
        let mut sampled = 0u64;

        for y in (0..frame.height).step_by(SAMPLE_STEP as usize) {
            for x in (0..frame.width).step_by(SAMPLE_STEP as usize) {
                let Some([r, g, b]) = frame.pixel(x, y) else {
                    continue;
                };
                sampled += 1;
                if r.min(g).min(b) >= self.threshold {
                    bright += 1;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        if bright == 0 {
            return Ok(Vec::new());
        }

        let box_w = (max_x - min_x + SAMPLE_STEP).min(frame.width - min_x);
        let box_h = (max_y - min_y + SAMPLE_STEP).min(frame.height - min_y);
        let area = (u64::from(box_w / SAMPLE_STEP).max(1)) * (u64::from(box_h / SAMPLE_STEP).max(1));
        // Fill ratio of the box; a solid blob scores near 1.
        let fill = (bright as f32 / area as f32).min(1.0);
        let coverage = bright as f32 / sampled.max(1) as f32;
        log::debug!(
            "stub backend: {} bright samples, fill {:.2}, coverage {:.3}",
            bright,
            fill,
            coverage
        );

        Ok(vec![RawPrediction {
            class: self.label.clone(),
            score: 0.5 + 0.5 * fill,
            bbox: [min_x as f32, min_y as f32, box_w as f32, box_h as f32],
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_square(x0: u32, y0: u32, size: u32) -> Frame {
        let (w, h) = (64u32, 48u32);
        let mut pixels = vec![20u8; (w * h * 3) as usize];
        for y in y0..(y0 + size) {
            for x in x0..(x0 + size) {
                let idx = ((y * w + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        Frame::from_rgb(pixels, w, h).unwrap()
    }

    #[test]
    fn dark_frame_has_no_predictions() {
        let mut backend = StubBackend::new();
        let frame = Frame::filled(32, 32, [10, 10, 10]).unwrap();
        assert!(backend.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn finds_bright_square() {
        let mut backend = StubBackend::new().with_label("square");
        let predictions = backend.detect(&frame_with_square(10, 8, 16)).unwrap();
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.class, "square");
        assert_eq!(p.bbox, [10.0, 8.0, 16.0, 16.0]);
        assert!(p.score > 0.9 && p.score <= 1.0);
    }
}
