//! Offline latency harness for inference backends.
//!
//! Bypasses live capture entirely: every call sees the same synthetic input,
//! so the numbers reflect the backend and nothing else.

pub mod stats;

use std::time::Instant;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{info, instrument};

use crate::inference::{InferenceBackend, InferenceError, InferenceParams};

pub use stats::BenchmarkStats;

/// Largest detection count difference still considered "similar".
pub const ACCURACY_TOLERANCE: usize = 2;

const PROGRESS_EVERY: usize = 20;
const INPUT_SEED: u64 = 0x5eed;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("benchmark needs at least one timed sample")]
    NoSamples,
}

#[derive(Debug, Clone, Copy)]
pub struct BenchmarkParams {
    /// Timed calls
    pub samples: usize,
    /// Discarded calls before timing starts
    pub warmup: usize,
    /// Side of the square synthetic input
    pub input_size: u32,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            samples: 100,
            warmup: 10,
            input_size: 640,
        }
    }
}

/// Two benchmark runs and the ratios derived from them.
#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    pub a: BenchmarkStats,
    pub b: BenchmarkStats,
    /// `mean_a / mean_b`
    pub speedup: f64,
    /// `fps_b / fps_a`
    pub throughput_gain: f64,
    /// `mean_a - mean_b`
    pub time_saved_ms: f64,
}

/// Detection counts of two backends on one image.
///
/// This is a coarse sanity check: equal counts say nothing about whether the
/// boxes or classes agree, and a lower-precision backend may legitimately
/// differ by a detection or two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyCheck {
    pub count_a: usize,
    pub count_b: usize,
    pub difference: usize,
    pub within_tolerance: bool,
}

/// Deterministic RGB noise of `size`x`size`.
pub fn synthetic_input(size: u32) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(INPUT_SEED);
    let mut image = RgbImage::new(size, size);
    rng.fill(&mut *image);
    image
}

/// Time `params.samples` calls after `params.warmup` discarded ones.
#[instrument(skip_all, fields(backend = backend.name()))]
pub fn benchmark(
    backend: &dyn InferenceBackend,
    params: &BenchmarkParams,
    inference: &InferenceParams,
) -> Result<BenchmarkStats, BenchError> {
    if params.samples == 0 {
        return Err(BenchError::NoSamples);
    }
    let input = synthetic_input(params.input_size);

    info!(
        "Benchmarking {}: {} frames, {} warmup, {}px",
        backend.name(),
        params.samples,
        params.warmup,
        params.input_size
    );
    backend.warm_up()?;
    for _ in 0..params.warmup {
        backend.infer(&input, inference)?;
    }

    let mut latencies = Vec::with_capacity(params.samples);
    for i in 0..params.samples {
        let started = Instant::now();
        backend.infer(&input, inference)?;
        latencies.push(started.elapsed().as_secs_f64() * 1e3);

        if (i + 1) % PROGRESS_EVERY == 0 {
            info!("Progress: {}/{}", i + 1, params.samples);
        }
    }

    BenchmarkStats::from_samples(&latencies).ok_or(BenchError::NoSamples)
}

/// Benchmark both backends with identical parameters.
pub fn compare(
    a: &dyn InferenceBackend,
    b: &dyn InferenceBackend,
    params: &BenchmarkParams,
    inference: &InferenceParams,
) -> Result<Comparison, BenchError> {
    let a = benchmark(a, params, inference)?;
    let b = benchmark(b, params, inference)?;
    Ok(Comparison {
        a,
        b,
        speedup: a.mean_ms / b.mean_ms,
        throughput_gain: b.fps / a.fps,
        time_saved_ms: a.mean_ms - b.mean_ms,
    })
}

/// Run each backend once on `image` and compare detection counts.
pub fn accuracy_delta(
    a: &dyn InferenceBackend,
    b: &dyn InferenceBackend,
    image: &RgbImage,
    inference: &InferenceParams,
) -> Result<AccuracyCheck, BenchError> {
    let count_a = a.infer(image, inference)?.len();
    let count_b = b.infer(image, inference)?.len();
    let difference = count_a.abs_diff(count_b);
    Ok(AccuracyCheck {
        count_a,
        count_b,
        difference,
        within_tolerance: difference <= ACCURACY_TOLERANCE,
    })
}
