use std::fmt;

/// Latency distribution of one benchmark run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkStats {
    pub samples: usize,
    pub mean_ms: f64,
    /// Population standard deviation
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    /// `1000 / mean_ms`
    pub fps: f64,
}

impl BenchmarkStats {
    /// Summarize per-call latencies. Returns `None` for an empty slice.
    pub fn from_samples(latencies_ms: &[f64]) -> Option<Self> {
        if latencies_ms.is_empty() {
            return None;
        }

        let n = latencies_ms.len() as f64;
        let mean_ms = latencies_ms.iter().sum::<f64>() / n;
        let variance = latencies_ms
            .iter()
            .map(|t| (t - mean_ms).powi(2))
            .sum::<f64>()
            / n;

        let mut sorted = latencies_ms.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median_ms = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            samples: sorted.len(),
            mean_ms,
            std_ms: variance.sqrt(),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            median_ms,
            fps: if mean_ms > 0.0 { 1000.0 / mean_ms } else { f64::INFINITY },
        })
    }
}

impl fmt::Display for BenchmarkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Mean inference: {:.2} ms", self.mean_ms)?;
        writeln!(f, "  Median:         {:.2} ms", self.median_ms)?;
        writeln!(f, "  Std deviation:  {:.2} ms", self.std_ms)?;
        writeln!(f, "  Min/Max:        {:.2} / {:.2} ms", self.min_ms, self.max_ms)?;
        write!(f, "  Average FPS:    {:.2}", self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_stats() {
        assert!(BenchmarkStats::from_samples(&[]).is_none());
    }

    #[test]
    fn known_distribution() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = BenchmarkStats::from_samples(&samples).unwrap();
        assert_eq!(stats.samples, 8);
        assert!((stats.mean_ms - 5.0).abs() < 1e-12);
        assert!((stats.std_ms - 2.0).abs() < 1e-12);
        assert_eq!(stats.min_ms, 2.0);
        assert_eq!(stats.max_ms, 9.0);
        assert!((stats.median_ms - 4.5).abs() < 1e-12);
        assert!((stats.fps - 200.0).abs() < 1e-9);
    }

    #[test]
    fn odd_count_median_is_middle_value() {
        let stats = BenchmarkStats::from_samples(&[30.0, 10.0, 20.0]).unwrap();
        assert_eq!(stats.median_ms, 20.0);
    }
}
