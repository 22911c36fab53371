//! Fixed-latency detector used for demos, benchmarks and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use image::RgbImage;

use super::backend::{
    postprocess, BoundingBox, Detection, InferenceBackend, InferenceError, InferenceParams,
};

const LABELS: &[&str] = &["person", "bicycle", "car", "dog", "chair", "bottle"];

/// Sleeps for a fixed latency and reports a fixed set of detections.
///
/// Boxes are laid out on a grid in normalized coordinates and scaled to the
/// input image, with confidences descending from 0.95 in steps of 0.1.
pub struct SyntheticBackend {
    name: String,
    latency: Duration,
    detection_count: usize,
    calls: AtomicU64,
}

impl SyntheticBackend {
    pub fn new(latency: Duration, detection_count: usize) -> Self {
        Self {
            name: format!("synthetic:{}ms", latency.as_millis()),
            latency,
            detection_count,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Number of `infer` calls served so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn raw_detections(&self, width: u32, height: u32) -> Vec<Detection> {
        let (w, h) = (width as f32, height as f32);
        (0..self.detection_count)
            .map(|i| {
                let col = (i % 4) as f32;
                let row = (i / 4 % 4) as f32;
                let class_id = (i % LABELS.len()) as u32;
                Detection {
                    class_id,
                    label: LABELS[class_id as usize].to_string(),
                    confidence: (0.95 - 0.1 * i as f32).max(0.0),
                    bbox: BoundingBox {
                        x0: (0.05 + col * 0.25) * w,
                        y0: (0.05 + row * 0.25) * h,
                        x1: (0.2 + col * 0.25) * w,
                        y1: (0.2 + row * 0.25) * h,
                    },
                }
            })
            .collect()
    }
}

impl InferenceBackend for SyntheticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, InferenceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::InvalidInput("empty image".into()));
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        Ok(postprocess(self.raw_detections(width, height), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_threshold_limits_detections() {
        let backend = SyntheticBackend::new(Duration::ZERO, 6);
        let image = RgbImage::new(100, 100);

        let all = backend
            .infer(
                &image,
                &InferenceParams {
                    confidence: 0.0,
                    ..InferenceParams::default()
                },
            )
            .unwrap();
        assert_eq!(all.len(), 6);

        // 0.95, 0.85, 0.75, 0.65, 0.55 pass 0.5
        let strict = backend
            .infer(
                &image,
                &InferenceParams {
                    confidence: 0.5,
                    ..InferenceParams::default()
                },
            )
            .unwrap();
        assert_eq!(strict.len(), 5);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn boxes_scale_with_image() {
        let backend = SyntheticBackend::new(Duration::ZERO, 1);
        let dets = backend
            .infer(&RgbImage::new(200, 100), &InferenceParams::default())
            .unwrap();
        let b = dets[0].bbox;
        assert!((b.x0 - 10.0).abs() < 1e-3 && (b.x1 - 40.0).abs() < 1e-3);
        assert!((b.y0 - 5.0).abs() < 1e-3 && (b.y1 - 20.0).abs() < 1e-3);
    }

    #[test]
    fn empty_image_is_rejected() {
        let backend = SyntheticBackend::new(Duration::ZERO, 1);
        assert!(backend
            .infer(&RgbImage::new(0, 0), &InferenceParams::default())
            .is_err());
    }
}
