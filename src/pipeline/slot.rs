//! Lock-free single-slot hand-off between a feed thread and the coordinator

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;

use crate::capture::FrameSample;

/// Capacity-1 overwrite buffer.
///
/// `publish` replaces whatever is pending, so the consumer always sees the
/// newest frame and never a backlog. Both operations are a single atomic
/// exchange; a sample is handed out at most once.
pub struct LatestFrameSlot {
    slot: ArcSwapOption<FrameSample>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub written: u64,
    pub read: u64,
    pub dropped: u64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: store `sample`, discarding any unread one. Never blocks.
    pub fn publish(&self, sample: FrameSample) {
        let previous = self.slot.swap(Some(Arc::new(sample)));
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);

        if let Some(stale) = previous {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("argus_frames_dropped", "feed" => stale.feed_id.to_string())
                .increment(1);
        }
    }

    /// Consumer: take the pending sample, leaving the slot empty.
    pub fn take(&self) -> Option<Arc<FrameSample>> {
        let sample = self.slot.swap(None)?;
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        Some(sample)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            written: self.stats.frames_written.load(Ordering::Relaxed),
            read: self.stats.frames_read.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FeedId;
    use image::RgbImage;

    fn sample(seq: u64) -> FrameSample {
        FrameSample::new(FeedId(0), RgbImage::new(1, 1), seq)
    }

    #[test]
    fn empty_slot_takes_nothing() {
        let slot = LatestFrameSlot::new();
        assert!(slot.is_empty());
        assert!(slot.take().is_none());
        assert_eq!(slot.stats(), SlotStats::default());
    }

    #[test]
    fn overwrite_counts_drops() {
        let slot = LatestFrameSlot::new();
        slot.publish(sample(1));
        slot.publish(sample(2));
        slot.publish(sample(3));

        assert_eq!(slot.take().map(|s| s.sequence), Some(3));
        assert!(slot.take().is_none());
        assert_eq!(
            slot.stats(),
            SlotStats {
                written: 3,
                read: 1,
                dropped: 2
            }
        );
    }
}
