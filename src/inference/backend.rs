use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::FeedId;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to load model {model:?}: {reason}")]
    Load { model: String, reason: String },
}

/// Axis-aligned box in pixel coordinates of the inferred image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix0 = self.x0.max(other.x0);
        let iy0 = self.y0.max(other.y0);
        let ix1 = self.x1.min(other.x1);
        let iy1 = self.y1.min(other.y1);
        let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    /// In [0, 1]
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detections for one consumed frame
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub feed_id: FeedId,
    pub sequence: u64,
    pub detections: Vec<Detection>,
}

/// Per-call thresholds handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    pub confidence: f32,
    pub iou: f32,
    /// Square network input edge in pixels
    pub input_size: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            iou: 0.45,
            input_size: 640,
        }
    }
}

/// Numeric precision requested for an optimized engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp16,
    Fp32,
}

/// Object detector consumed by the coordinator and the benchmark harness.
///
/// Treated as a pure function of its input: calls may be repeated freely and
/// the caller never depends on hidden state between them. Implementations
/// that cache internally must do so behind `&self`.
pub trait InferenceBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Run detection on one image.
    fn infer(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, InferenceError> {
        (**self).infer(image, params)
    }

    fn warm_up(&self) -> Result<(), InferenceError> {
        (**self).warm_up()
    }
}

/// Confidence filter followed by greedy per-class non-maximum suppression.
///
/// Output is sorted by descending confidence.
pub fn postprocess(mut detections: Vec<Detection>, params: &InferenceParams) -> Vec<Detection> {
    detections.retain(|d| d.confidence >= params.confidence);
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > params.iou);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, x0: f32) -> Detection {
        Detection {
            class_id,
            label: format!("class{class_id}"),
            confidence,
            bbox: BoundingBox {
                x0,
                y0: 0.0,
                x1: x0 + 10.0,
                y1: 10.0,
            },
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = det(0, 1.0, 0.0).bbox;
        let b = det(0, 1.0, 100.0).bbox;
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn postprocess_filters_and_suppresses() {
        let params = InferenceParams::default();
        let out = postprocess(
            vec![
                det(0, 0.5, 0.0),
                det(0, 0.9, 1.0),  // overlaps the first, higher score wins
                det(1, 0.6, 1.0),  // other class survives
                det(2, 0.1, 50.0), // below threshold
            ],
            &params,
        );
        let scores: Vec<f32> = out.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
    }
}
