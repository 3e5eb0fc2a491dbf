#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::coco_label;
use crate::detect::prediction::RawPrediction;
use crate::frame::Frame;

pub const DEFAULT_MIN_SCORE: f32 = 0.5;
pub const DEFAULT_MAX_DETECTIONS: usize = 20;

/// Tract-based backend for SSD-style ONNX detectors.
///
/// Expects the TensorFlow object-detection export layout: a uint8 NHWC image input
/// and `detection_boxes`, `detection_classes`, `detection_scores`, `num_detections`
/// outputs, with boxes as normalized `[ymin, xmin, ymax, xmax]`.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    outputs: OutputSlots,
    width: u32,
    height: u32,
    min_score: f32,
    max_detections: usize,
}

#[derive(Debug, Clone, Copy)]
struct OutputSlots {
    boxes: usize,
    classes: usize,
    scores: usize,
    count: Option<usize>,
}

impl OutputSlots {
    fn from_names(names: &[String]) -> Result<Self> {
        let find = |needle: &str| names.iter().position(|name| name.contains(needle));
        Ok(Self {
            boxes: find("boxes").ok_or_else(|| anyhow!("model has no *boxes output: {:?}", names))?,
            classes: find("classes")
                .ok_or_else(|| anyhow!("model has no *classes output: {:?}", names))?,
            scores: find("scores")
                .ok_or_else(|| anyhow!("model has no *scores output: {:?}", names))?,
            count: find("num_detections"),
        })
    }
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for `width`x`height` input.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let typed = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?;

        let names = typed
            .output_outlets()
            .context("failed to read model outputs")?
            .iter()
            .map(|outlet| {
                typed
                    .outlet_label(*outlet)
                    .map(str::to_string)
                    .unwrap_or_else(|| typed.node(outlet.node).name.clone())
            })
            .collect::<Vec<_>>();
        let outputs = OutputSlots::from_names(&names)?;

        let model = typed
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            outputs,
            width,
            height,
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Override the default minimum score.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Override the default cap on returned boxes.
    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, channel)| resized.get_pixel(x as u32, y as u32).0[channel],
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: &TVec<TValue>, frame: &Frame) -> Result<Vec<RawPrediction>> {
        let tensor = |idx: usize| {
            outputs
                .get(idx)
                .ok_or_else(|| anyhow!("model produced no output #{}", idx))
        };
        let boxes = tensor(self.outputs.boxes)?
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let classes = tensor(self.outputs.classes)?
            .cast_to::<f32>()
            .context("classes output is not numeric")?
            .into_owned();
        let classes = classes.to_array_view::<f32>()?;
        let scores = tensor(self.outputs.scores)?
            .to_array_view::<f32>()
            .context("scores output was not f32")?;

        let available = scores.len().min(classes.len()).min(boxes.len() / 4);
        let count = match self.outputs.count {
            Some(idx) => {
                let num = tensor(idx)?
                    .cast_to::<f32>()
                    .context("num_detections output is not numeric")?
                    .into_owned();
                let num = num.to_array_view::<f32>()?.iter().next().copied().unwrap_or(0.0);
                (num.max(0.0) as usize).min(available)
            }
            None => available,
        };

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let frame_w = frame.width as f32;
        let frame_h = frame.height as f32;

        let mut predictions = Vec::new();
        for i in 0..count {
            let score = scores[i];
            if score < self.min_score {
                continue;
            }
            let class_id = classes[i].round().max(0.0) as u32;
            let Some(label) = coco_label(class_id) else {
                log::debug!("tract backend: skipping unknown class id {}", class_id);
                continue;
            };
            let ymin = boxes[i * 4].clamp(0.0, 1.0);
            let xmin = boxes[i * 4 + 1].clamp(0.0, 1.0);
            let ymax = boxes[i * 4 + 2].clamp(0.0, 1.0);
            let xmax = boxes[i * 4 + 3].clamp(0.0, 1.0);
            predictions.push(RawPrediction {
                class: label.to_string(),
                score,
                bbox: [
                    xmin * frame_w,
                    ymin * frame_h,
                    (xmax - xmin).max(0.0) * frame_w,
                    (ymax - ymin).max(0.0) * frame_h,
                ],
            });
        }

        predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
        predictions.truncate(self.max_detections);
        Ok(predictions)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawPrediction>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(&outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.width, self.height, [0, 0, 0])?;
        self.detect(&blank).map(|_| ())
    }
}
