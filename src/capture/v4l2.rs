//! V4L2 device capture with memory-mapped buffers

use std::path::Path;

use image::RgbImage;
use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::frame::PixelFormat;
use super::source::{CaptureError, CaptureHandle, CaptureSource};

const BUFFER_COUNT: u32 = 4;
/// `/dev/video0` to `/dev/video{N-1}` are scanned by `auto`
const SCAN_DEVICES: u32 = 10;

/// Device picked by [`auto_detect_device`]
#[derive(Debug, Clone)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

/// First capture-capable device under `/dev`, preferring one that
/// advertises MJPEG over one that only offers YUYV.
pub fn auto_detect_device() -> Result<FoundDevice, CaptureError> {
    info!("Auto-detecting capture devices...");

    let candidates: Vec<FoundDevice> = (0..SCAN_DEVICES)
        .map(|i| format!("/dev/video{i}"))
        .filter(|path| Path::new(path).exists())
        .filter_map(inspect)
        .collect();

    candidates
        .iter()
        .find(|d| d.format == PixelFormat::Mjpeg)
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| CaptureError::OpenFailed("no suitable capture device found".into()))
}

fn inspect(path: String) -> Option<FoundDevice> {
    let device = Device::with_path(&path).ok()?;
    let caps = device.query_caps().ok()?;
    if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
        return None;
    }

    let fourccs: Vec<FourCC> = device
        .enum_formats()
        .ok()?
        .into_iter()
        .map(|f| f.fourcc)
        .collect();
    let format = if fourccs.contains(&FourCC::new(b"MJPG")) {
        PixelFormat::Mjpeg
    } else if fourccs.contains(&FourCC::new(b"YUYV")) {
        PixelFormat::Yuyv4
    } else {
        debug!("{}: no MJPEG or YUYV format, skipping", path);
        return None;
    };

    info!("Found {:?} device: {} - {}", format, path, caps.card);
    Some(FoundDevice { path, format })
}

/// V4L2 device, opened lazily on the feed thread
pub struct V4l2Source {
    path: String,
}

impl V4l2Source {
    /// `path` may be `/dev/videoN`, a bare index, or `auto`.
    pub fn new(path: String) -> Self {
        Self { path }
    }

    fn resolve(&self) -> Result<FoundDevice, CaptureError> {
        if self.path == "auto" {
            return auto_detect_device();
        }
        let path = match self.path.parse::<u32>() {
            Ok(index) => format!("/dev/video{index}"),
            Err(_) => self.path.clone(),
        };
        Ok(FoundDevice {
            path,
            format: PixelFormat::Mjpeg,
        })
    }
}

impl CaptureSource for V4l2Source {
    fn describe(&self) -> String {
        format!("v4l2 {}", self.path)
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let found = self.resolve()?;
        let open_err =
            |e: std::io::Error| CaptureError::OpenFailed(format!("{}: {e}", found.path));

        let device = Device::with_path(&found.path).map_err(open_err)?;

        let caps = device.query_caps().map_err(open_err)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::OpenFailed(format!(
                "{}: device doesn't support video capture",
                found.path
            )));
        }

        // Keep the driver's resolution, only ask for our preferred encoding
        let mut fmt = device.format().map_err(open_err)?;
        fmt.fourcc = match found.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };
        let fmt = device.set_format(&fmt).map_err(open_err)?;

        let format = match &fmt.fourcc.repr {
            b"MJPG" => PixelFormat::Mjpeg,
            b"YUYV" => PixelFormat::Yuyv4,
            b"RGB3" => PixelFormat::Rgb24,
            b"BGR3" => PixelFormat::Bgr24,
            _ => return Err(CaptureError::UnsupportedFormat(fmt.fourcc.to_string())),
        };

        let device = Box::new(device);
        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(open_err)?;
        info!(
            "Capture stream started: {}x{} {:?} with {} buffers",
            fmt.width, fmt.height, format, BUFFER_COUNT
        );

        Ok(Box::new(V4l2Handle {
            stream: Some(stream),
            _device: device,
            width: fmt.width,
            height: fmt.height,
            format,
        }))
    }
}

struct V4l2Handle {
    // Declared before the device so it drops first
    stream: Option<MmapStream<'static>>,
    _device: Box<Device>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl CaptureHandle for V4l2Handle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::EndOfStream)?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());
        decoder::decode_frame(&buf[..used], self.format, self.width, self.height).map(Some)
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
