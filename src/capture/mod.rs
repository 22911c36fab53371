pub mod decoder;
pub mod feed;
pub mod frame;
pub mod gst_pipeline;
pub mod images;
pub mod source;
pub mod synthetic;

#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use feed::{CaptureFeed, FeedError, FeedOptions, FeedState};
pub use frame::{FeedId, FrameSample, PixelFormat};
pub use source::{CaptureError, CaptureHandle, CaptureSource, SourceSpec};
