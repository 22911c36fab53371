use std::fmt;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Identifier of one camera feed.
///
/// Assigned at configuration time and fixed for the lifetime of the feed. The
/// ordering of ids is the order in which the coordinator visits feeds and the
/// order in which their frames appear in the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub u32);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cam{}", self.0)
    }
}

/// One captured frame, handed from a feed thread to the coordinator.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub feed_id: FeedId,

    /// Decoded RGB pixels, owned by the sample
    pub image: RgbImage,

    /// Monotonically increasing per feed, starting at 1
    pub sequence: u64,

    /// When the feed thread published the frame; the coordinator measures
    /// capture-to-result latency from here
    pub captured_at: Instant,
}

impl FrameSample {
    pub fn new(feed_id: FeedId, image: RgbImage, sequence: u64) -> Self {
        Self {
            feed_id,
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }
}

/// Raw pixel formats a device may deliver before decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
}
