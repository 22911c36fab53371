//! GStreamer appsink capture

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{info, instrument, warn};

use super::decoder;
use super::frame::PixelFormat;
use super::source::{CaptureError, CaptureHandle, CaptureSource};

/// Upper bound on one pull so stop requests are seen promptly
const PULL_TIMEOUT_MS: u64 = 100;

/// Pipeline description run on the feed thread
pub struct GstSource {
    description: String,
}

impl GstSource {
    pub fn new(description: String) -> Self {
        Self { description }
    }
}

impl CaptureSource for GstSource {
    fn describe(&self) -> String {
        format!("gstreamer `{}`", self.description)
    }

    #[instrument(skip(self))]
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let open_err = |msg: String| CaptureError::OpenFailed(msg);

        gst::init().map_err(|e| open_err(format!("failed to initialize GStreamer: {e}")))?;
        info!("Pipeline: {}", self.description);

        let pipeline = gst::parse::launch(&self.description)
            .map_err(|e| open_err(format!("invalid pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| open_err("description is not a pipeline".into()))?;

        let appsink = pipeline
            .iterate_sinks()
            .find(|element| element.is::<gst_app::AppSink>())
            .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| open_err("pipeline has no appsink".into()))?;

        // Lowest latency: never queue behind the consumer
        appsink.set_property("emit-signals", false);
        appsink.set_property("sync", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| open_err(format!("failed to start pipeline: {e:?}")))?;

        let (state_change, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(5)));
        match state_change {
            Ok(gst::StateChangeSuccess::Success) | Ok(gst::StateChangeSuccess::Async) => {}
            _ => {
                let _ = pipeline.set_state(gst::State::Null);
                return Err(open_err("pipeline did not reach PLAYING".into()));
            }
        }

        Ok(Box::new(GstHandle {
            pipeline,
            appsink,
            closed: false,
        }))
    }
}

struct GstHandle {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    closed: bool,
}

impl CaptureHandle for GstHandle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let Some(sample) = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        else {
            if self.appsink.is_eos() {
                return Err(CaptureError::EndOfStream);
            }
            return Ok(None);
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::ReadFailed("sample contains no buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::ReadFailed("sample has no caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| CaptureError::ReadFailed("failed to parse video info".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::ReadFailed("failed to map buffer".into()))?;

        let format = match info.format() {
            gst_video::VideoFormat::Rgb => PixelFormat::Rgb24,
            gst_video::VideoFormat::Bgr => PixelFormat::Bgr24,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };
        let (width, height) = (info.width(), info.height());
        let stride = info.stride()[0] as usize;
        let row = width as usize * 3;

        // Strip row padding when the stride is wider than the image
        let data = map.as_slice();
        let packed;
        let pixels = if stride == row {
            data
        } else {
            packed = data
                .chunks(stride)
                .take(height as usize)
                .flat_map(|line| &line[..row.min(line.len())])
                .copied()
                .collect::<Vec<u8>>();
            &packed[..]
        };

        decoder::decode_frame(pixels, format, width, height).map(Some)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("Stopping GStreamer pipeline");
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop pipeline: {:?}", e);
        }
    }
}

impl Drop for GstHandle {
    fn drop(&mut self) {
        self.close();
    }
}
