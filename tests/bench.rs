use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus::bench::{self, BenchmarkParams};
use argus::inference::{InferenceParams, SyntheticBackend};

fn params(samples: usize, warmup: usize) -> BenchmarkParams {
    BenchmarkParams {
        samples,
        warmup,
        input_size: 64,
    }
}

#[test]
fn fixed_latency_backend_measures_its_latency() {
    let backend = SyntheticBackend::new(Duration::from_millis(10), 1);
    let stats = bench::benchmark(&backend, &params(50, 5), &InferenceParams::default()).unwrap();
    let latency_ms = backend.latency().as_secs_f64() * 1e3;

    assert_eq!(backend.calls(), 55);
    assert_eq!(stats.samples, 50);
    assert!(
        (latency_ms..latency_ms * 1.25).contains(&stats.mean_ms),
        "mean {} ms",
        stats.mean_ms
    );
    assert!((80.0..=100.0).contains(&stats.fps), "fps {}", stats.fps);
    assert!(stats.min_ms >= latency_ms);
    assert!(stats.min_ms <= stats.median_ms && stats.median_ms <= stats.max_ms);
}

#[test]
fn compare_reports_speedup_of_faster_backend() {
    let slow = SyntheticBackend::new(Duration::from_millis(20), 1);
    let fast = SyntheticBackend::new(Duration::from_millis(10), 1);
    let cmp = bench::compare(&slow, &fast, &params(20, 2), &InferenceParams::default()).unwrap();

    assert!((1.6..2.2).contains(&cmp.speedup), "speedup {}", cmp.speedup);
    assert!(
        (cmp.throughput_gain - cmp.speedup).abs() < 1e-9,
        "fps ratio mirrors mean ratio"
    );
    assert!(cmp.time_saved_ms > 7.0);
}

#[test]
fn identical_backend_is_within_tolerance() {
    let backend = SyntheticBackend::new(Duration::ZERO, 4);
    let image = bench::synthetic_input(128);
    let check =
        bench::accuracy_delta(&backend, &backend, &image, &InferenceParams::default()).unwrap();

    assert_eq!(check.count_a, 4);
    assert_eq!(check.difference, 0);
    assert!(check.within_tolerance);
}

#[test]
fn large_count_difference_is_flagged() {
    let a = SyntheticBackend::new(Duration::ZERO, 3);
    let b = SyntheticBackend::new(Duration::ZERO, 6);
    let image = bench::synthetic_input(128);
    let check = bench::accuracy_delta(&a, &b, &image, &InferenceParams::default()).unwrap();

    assert_eq!((check.count_a, check.count_b), (3, 6));
    assert_eq!(check.difference, bench::ACCURACY_TOLERANCE + 1);
    assert!(!check.within_tolerance);
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn progress_is_logged_at_info_level() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let backend = SyntheticBackend::new(Duration::ZERO, 1);
    tracing::subscriber::with_default(subscriber, || {
        bench::benchmark(&backend, &params(40, 0), &InferenceParams::default()).unwrap();
    });

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("Progress: 20/40"), "{output}");
    assert!(output.contains("Progress: 40/40"), "{output}");
}
