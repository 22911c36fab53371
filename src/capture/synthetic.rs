//! Generated test-pattern source, for running without camera hardware

use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use super::source::{CaptureError, CaptureHandle, CaptureSource};

pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: Option<f32>,
    frame_limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: None,
            frame_limit: None,
        }
    }

    /// Pace reads to roughly `fps` frames per second.
    pub fn with_fps(mut self, fps: Option<f32>) -> Self {
        self.fps = fps.filter(|f| *f > 0.0);
        self
    }

    /// Report end-of-stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
        self.frame_limit = limit;
        self
    }
}

impl CaptureSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }

    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::OpenFailed(self.describe()));
        }
        Ok(Box::new(SyntheticHandle {
            width: self.width,
            height: self.height,
            interval: self.fps.map(|fps| Duration::from_secs_f32(1.0 / fps)),
            frame_limit: self.frame_limit,
            produced: 0,
            next_due: Instant::now(),
        }))
    }
}

struct SyntheticHandle {
    width: u32,
    height: u32,
    interval: Option<Duration>,
    frame_limit: Option<u64>,
    produced: u64,
    next_due: Instant,
}

impl CaptureHandle for SyntheticHandle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(CaptureError::EndOfStream);
        }

        if let Some(interval) = self.interval {
            let now = Instant::now();
            if now < self.next_due {
                thread::sleep(self.next_due - now);
            }
            self.next_due = Instant::now() + interval;
        }

        let frame = pattern(self.width, self.height, self.produced);
        self.produced += 1;
        Ok(Some(frame))
    }
}

/// Diagonal gradient that scrolls one pixel per frame
fn pattern(width: u32, height: u32, phase: u64) -> RgbImage {
    let shift = (phase % 256) as u32;
    RgbImage::from_fn(width, height, |x, y| {
        let r = ((x + shift) * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = ((x + y + shift) % 256) as u8;
        Rgb([r, g, b])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_limit_ends_stream() {
        let mut source = SyntheticSource::new(4, 4).with_frame_limit(Some(2));
        let mut handle = source.open().unwrap();
        assert!(handle.read().unwrap().is_some());
        assert!(handle.read().unwrap().is_some());
        assert!(matches!(handle.read(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn zero_sized_source_fails_to_open() {
        let mut source = SyntheticSource::new(0, 4);
        assert!(matches!(source.open(), Err(CaptureError::OpenFailed(_))));
    }
}
