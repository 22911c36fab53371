//! Capture resource boundary.
//!
//! A [`CaptureSource`] describes where frames come from (a device, a pipeline
//! description, a directory of stills) and knows how to open it. Opening yields
//! a [`CaptureHandle`] which is owned by exactly one feed thread for its whole
//! life; it does not need to be `Send`.

use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gst_pipeline::PipelineSpec;
use super::images::ImageSequenceSource;
use super::synthetic::SyntheticSource;
use crate::GStreamerConfig;

/// Errors raised by capture sources and handles.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open {0}")]
    OpenFailed(String),

    #[error("failed to read frame: {0}")]
    ReadFailed(String),

    #[error("end of stream")]
    EndOfStream,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("source kind {0:?} is not compiled into this build")]
    Unavailable(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl CaptureError {
    /// Terminal errors end the feed immediately; others may be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureError::EndOfStream
                | CaptureError::UnsupportedFormat(_)
                | CaptureError::Unavailable(_)
        )
    }
}

/// Something that can be opened into a live capture handle.
pub trait CaptureSource: Send {
    /// Human readable description for logs.
    fn describe(&self) -> String;

    /// Open the underlying resource.
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// An open capture resource.
pub trait CaptureHandle {
    /// Read the next frame.
    ///
    /// `Ok(None)` means no frame was ready within the handle's internal wait;
    /// the caller loops again after checking for a stop request.
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError>;

    /// Release the resource. Called exactly once by the owning feed.
    fn close(&mut self) {}
}

/// Configured description of a feed's source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Generated test pattern
    Synthetic {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default)]
        fps: Option<f32>,
        #[serde(default)]
        frame_limit: Option<u64>,
    },
    /// Directory of still images, read in file name order
    Images {
        path: PathBuf,
        #[serde(default)]
        looping: bool,
    },
    /// V4L2 device path, index, or "auto"
    Device { path: String },
    /// GStreamer pipeline ending in an appsink
    Pipeline(PipelineSpec),
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl SourceSpec {
    /// Build the capture source described by this entry.
    pub fn build(&self, gst: &GStreamerConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
        match self {
            SourceSpec::Synthetic {
                width,
                height,
                fps,
                frame_limit,
            } => Ok(Box::new(
                SyntheticSource::new(*width, *height)
                    .with_fps(*fps)
                    .with_frame_limit(*frame_limit),
            )),
            SourceSpec::Images { path, looping } => {
                Ok(Box::new(ImageSequenceSource::new(path.clone(), *looping)))
            }
            SourceSpec::Device { path } => build_device(path),
            SourceSpec::Pipeline(spec) => build_pipeline(spec.describe(gst.compat)?),
        }
    }
}

#[cfg(feature = "v4l2")]
fn build_device(path: &str) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(super::v4l2::V4l2Source::new(path.to_string())))
}

#[cfg(not(feature = "v4l2"))]
fn build_device(_path: &str) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Unavailable("device"))
}

#[cfg(feature = "gstreamer-pipeline")]
fn build_pipeline(description: String) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(super::gst_capture::GstSource::new(description)))
}

#[cfg(not(feature = "gstreamer-pipeline"))]
fn build_pipeline(_description: String) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Unavailable("pipeline"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_spec_builds() {
        let spec = SourceSpec::Synthetic {
            width: 32,
            height: 16,
            fps: None,
            frame_limit: Some(1),
        };
        let source = spec.build(&GStreamerConfig::default()).unwrap();
        assert!(source.describe().contains("32x16"));
    }

    #[cfg(not(feature = "v4l2"))]
    #[test]
    fn device_without_feature_is_unavailable() {
        let spec = SourceSpec::Device {
            path: "/dev/video0".into(),
        };
        let err = spec.build(&GStreamerConfig::default()).err().unwrap();
        assert!(matches!(err, CaptureError::Unavailable("device")));
    }
}
