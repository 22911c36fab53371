//! Per-feed counters and the end-of-run report.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::capture::{FeedId, FeedState};

/// Coordinator-owned counters for one feed.
///
/// Two separate throughput figures are tracked:
/// - window throughput: frames since the previous statistics line divided by
///   the time since that line; reported in statistics lines
/// - display FPS: the inverse of the time since this feed's previous display
///   call; shown in the tile caption
#[derive(Debug)]
pub struct FeedCounters {
    feed_id: FeedId,
    frames_processed: AtomicU64,
    window_start: Instant,
    window_frames: u64,
    last_display: Option<Instant>,
    /// Capture-to-result time summed over every processed frame
    latency_total: Duration,
}

impl FeedCounters {
    pub fn new(feed_id: FeedId) -> Self {
        Self {
            feed_id,
            frames_processed: AtomicU64::new(0),
            window_start: Instant::now(),
            window_frames: 0,
            last_display: None,
            latency_total: Duration::ZERO,
        }
    }

    /// Count one processed frame that took `latency` from capture to
    /// detections; returns the new total.
    pub fn record(&mut self, latency: Duration) -> u64 {
        self.window_frames += 1;
        self.latency_total += latency;
        let feed = self.feed_id.to_string();
        metrics::histogram!("argus_capture_latency_ms", "feed" => feed.clone())
            .record(latency.as_secs_f64() * 1e3);
        metrics::counter!("argus_frames_processed", "feed" => feed).increment(1);
        self.frames_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Average capture-to-result latency, `None` before the first frame.
    pub fn mean_latency(&self) -> Option<Duration> {
        let frames = u32::try_from(self.processed()).ok().filter(|n| *n > 0)?;
        Some(self.latency_total / frames)
    }

    /// Windowed throughput since the previous call, then start a new window.
    pub fn take_window_fps(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
        let frames = self.window_frames;
        self.window_start = now;
        self.window_frames = 0;
        (elapsed > 0.0 && frames > 0).then(|| frames as f64 / elapsed)
    }

    /// Instantaneous display rate relative to the previous display call.
    pub fn display_tick(&mut self, now: Instant) -> Option<f64> {
        let previous = self.last_display.replace(now)?;
        let elapsed = now.saturating_duration_since(previous).as_secs_f64();
        (elapsed > 0.0).then(|| 1.0 / elapsed)
    }

    /// Statistics line for this feed, closing the current window.
    pub fn stats_line(&mut self, now: Instant) -> String {
        let fps = self.take_window_fps(now);
        format_stats_line(self.feed_id, self.processed(), fps)
    }
}

/// `{feed}: {frames} frames [({fps} fps)]`
pub fn format_stats_line(feed: FeedId, frames: u64, fps: Option<f64>) -> String {
    match fps {
        Some(fps) => format!("{feed}: {frames} frames ({fps:.1} fps)"),
        None => format!("{feed}: {frames} frames"),
    }
}

/// Final state of one feed
#[derive(Debug, Clone)]
pub struct FeedReport {
    pub feed_id: FeedId,
    pub description: String,
    pub frames_processed: u64,
    /// Frames published by the capture thread
    pub frames_captured: u64,
    /// Frames overwritten before the coordinator took them
    pub frames_dropped: u64,
    /// Mean time from capture to detections
    pub mean_latency: Option<Duration>,
    pub state: FeedState,
    pub failure: Option<String>,
}

/// Outcome of a coordinator run, sorted by feed id
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub feeds: Vec<FeedReport>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn feed(&self, id: FeedId) -> Option<&FeedReport> {
        self.feeds.iter().find(|f| f.feed_id == id)
    }

    pub fn frames_processed(&self, id: FeedId) -> u64 {
        self.feed(id).map_or(0, |f| f.frames_processed)
    }

    pub fn all_failed(&self) -> bool {
        !self.feeds.is_empty() && self.feeds.iter().all(|f| f.state == FeedState::Failed)
    }

    /// One line summarizing every feed
    pub fn final_status_line(&self) -> String {
        let mut line = String::from("Final statistics:");
        for (i, feed) in self.feeds.iter().enumerate() {
            let sep = if i == 0 { " " } else { " | " };
            let _ = write!(
                line,
                "{sep}{}: {} frames processed",
                feed.feed_id, feed.frames_processed
            );
            if feed.frames_dropped > 0 {
                let _ = write!(line, ", {} dropped", feed.frames_dropped);
            }
            if let Some(reason) = &feed.failure {
                let _ = write!(line, " (failed: {reason})");
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn stats_line_format() {
        assert_eq!(format_stats_line(FeedId(2), 30, None), "Cam2: 30 frames");
        assert_eq!(
            format_stats_line(FeedId(0), 60, Some(29.96)),
            "Cam0: 60 frames (30.0 fps)"
        );
    }

    #[test]
    fn window_resets_after_each_line() {
        let mut counters = FeedCounters::new(FeedId(0));
        let start = counters.window_start;
        for _ in 0..30 {
            counters.record(Duration::ZERO);
        }
        let fps = counters.take_window_fps(start + Duration::from_secs(2)).unwrap();
        assert!((fps - 15.0).abs() < 1e-9);
        assert_eq!(counters.processed(), 30);

        // Empty window reports nothing
        assert!(counters
            .take_window_fps(start + Duration::from_secs(3))
            .is_none());
    }

    #[test]
    fn display_fps_uses_previous_display_call() {
        let mut counters = FeedCounters::new(FeedId(0));
        let t0 = Instant::now();
        assert!(counters.display_tick(t0).is_none());
        let fps = counters.display_tick(t0 + Duration::from_millis(40)).unwrap();
        assert!((fps - 25.0).abs() < 1e-6);
    }

    #[test]
    fn mean_latency_averages_recorded_frames() {
        let mut counters = FeedCounters::new(FeedId(3));
        assert!(counters.mean_latency().is_none());
        counters.record(Duration::from_millis(10));
        counters.record(Duration::from_millis(30));
        assert_eq!(counters.mean_latency(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn final_status_mentions_failures() {
        let report = RunReport {
            feeds: vec![
                FeedReport {
                    feed_id: FeedId(0),
                    description: "synthetic".into(),
                    frames_processed: 90,
                    frames_captured: 120,
                    frames_dropped: 30,
                    mean_latency: Some(Duration::from_millis(12)),
                    state: FeedState::Stopped,
                    failure: None,
                },
                FeedReport {
                    feed_id: FeedId(1),
                    description: "v4l2 /dev/video1".into(),
                    frames_processed: 0,
                    frames_captured: 0,
                    frames_dropped: 0,
                    mean_latency: None,
                    state: FeedState::Failed,
                    failure: Some("open failed".into()),
                },
            ],
            cancelled: true,
        };
        assert_eq!(
            report.final_status_line(),
            "Final statistics: Cam0: 90 frames processed, 30 dropped | \
             Cam1: 0 frames processed (failed: open failed)"
        );
        assert!(!report.all_failed());
    }
}
