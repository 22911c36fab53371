pub mod backend;
pub mod synthetic;

use std::time::Duration;

use tracing::{info, instrument};

pub use backend::{
    postprocess, BoundingBox, Detection, DetectionResult, InferenceBackend, InferenceError,
    InferenceParams, Precision,
};
pub use synthetic::SyntheticBackend;

const DEFAULT_SYNTHETIC_LATENCY_MS: u64 = 5;
const DEFAULT_SYNTHETIC_DETECTIONS: usize = 3;

/// Construct a backend from a model identifier.
///
/// Recognized identifiers:
/// - `synthetic`
/// - `synthetic:<latency_ms>`
/// - `synthetic:<latency_ms>:<detections>`
///
/// Anything else fails with [`InferenceError::Load`]; there is no fallback.
#[instrument]
pub fn from_model_id(
    model: &str,
    precision: Precision,
) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    let load_err = |reason: String| InferenceError::Load {
        model: model.to_string(),
        reason,
    };

    let mut parts = model.split(':');
    match parts.next() {
        Some("synthetic") => {
            let latency_ms = match parts.next() {
                Some(ms) => ms
                    .trim_end_matches("ms")
                    .parse::<u64>()
                    .map_err(|e| load_err(format!("latency {ms:?}: {e}")))?,
                None => DEFAULT_SYNTHETIC_LATENCY_MS,
            };
            let detections = match parts.next() {
                Some(n) => n
                    .parse::<usize>()
                    .map_err(|e| load_err(format!("detection count {n:?}: {e}")))?,
                None => DEFAULT_SYNTHETIC_DETECTIONS,
            };
            if parts.next().is_some() {
                return Err(load_err("too many fields".into()));
            }

            info!(
                "Loaded synthetic backend: {}ms, {} detections, {:?}",
                latency_ms, detections, precision
            );
            Ok(Box::new(
                SyntheticBackend::new(Duration::from_millis(latency_ms), detections)
                    .with_name(model),
            ))
        }
        _ => Err(load_err("no backend registered for this identifier".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_synthetic_ids() {
        let backend = from_model_id("synthetic:12:4", Precision::Fp16).unwrap();
        assert_eq!(backend.name(), "synthetic:12:4");

        assert!(from_model_id("synthetic", Precision::Fp32).is_ok());
        assert!(from_model_id("synthetic:8ms", Precision::Fp32).is_ok());
    }

    #[test]
    fn unknown_model_fails_to_load() {
        let err = from_model_id("yolov8n.pt", Precision::Fp16).err().unwrap();
        assert!(matches!(err, InferenceError::Load { .. }));

        let err = from_model_id("synthetic:fast", Precision::Fp16).err().unwrap();
        assert!(matches!(err, InferenceError::Load { .. }));
    }
}
