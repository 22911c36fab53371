//! GStreamer pipeline description builder.
//!
//! Pure string construction, available with or without the GStreamer runtime.
//! The compatibility mode is resolved once from configuration and passed in;
//! nothing here consults the environment.

use serde::{Deserialize, Serialize};

use super::source::CaptureError;

/// Appsink settings differ between L4T releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GstCompat {
    /// L4T < 35: `max-buffers` is not honoured on the appsink
    Legacy,
    #[default]
    Modern,
}

/// CSI camera parameters for `nvarguscamerasrc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsiParams {
    pub sensor_id: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub framerate: u32,
    /// nvvidconv flip method, 0..=5
    pub flip_method: u8,
}

impl Default for CsiParams {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            capture_width: 1920,
            capture_height: 1080,
            display_width: 1280,
            display_height: 720,
            framerate: 30,
            flip_method: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum PipelineSpec {
    Csi(CsiParams),
    V4l2 {
        device: String,
        width: u32,
        height: u32,
    },
    /// Used verbatim; must contain an element named `appsink` or end in one
    Custom { description: String },
}

impl PipelineSpec {
    pub fn describe(&self, compat: GstCompat) -> Result<String, CaptureError> {
        match self {
            PipelineSpec::Csi(params) => csi_pipeline(params, compat),
            PipelineSpec::V4l2 {
                device,
                width,
                height,
            } => Ok(v4l2_pipeline(device, *width, *height)),
            PipelineSpec::Custom { description } => Ok(description.clone()),
        }
    }
}

/// Hardware-accelerated CSI pipeline (`nvarguscamerasrc` + `nvvidconv`).
pub fn csi_pipeline(params: &CsiParams, compat: GstCompat) -> Result<String, CaptureError> {
    if params.flip_method > 5 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "flip method {} (expected 0-5)",
            params.flip_method
        )));
    }

    // NV12 is what the ISP hands out on Jetson
    let pixel_format = "NV12";
    let appsink_extras = match compat {
        GstCompat::Legacy => "drop=1",
        GstCompat::Modern => "drop=1, max-buffers=1",
    };

    Ok(format!(
        "nvarguscamerasrc sensor-id={} ! \
         video/x-raw(memory:NVMM), \
         width=(int){}, height=(int){}, \
         format=(string){}, framerate=(fraction){}/1 ! \
         nvvidconv flip-method={} ! \
         video/x-raw, width=(int){}, height=(int){}, \
         format=(string)BGRx ! \
         videoconvert ! \
         video/x-raw, format=(string)BGR ! \
         appsink {}",
        params.sensor_id,
        params.capture_width,
        params.capture_height,
        pixel_format,
        params.framerate,
        params.flip_method,
        params.display_width,
        params.display_height,
        appsink_extras
    ))
}

/// Plain V4L2 pipeline, the fallback when no CSI camera is present.
pub fn v4l2_pipeline(device: &str, width: u32, height: u32) -> String {
    format!(
        "v4l2src device={} ! \
         video/x-raw, width=(int){}, height=(int){} ! \
         videoconvert ! \
         video/x-raw, format=(string)BGR ! \
         appsink drop=1",
        device, width, height
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_compat_limits_appsink_buffers() {
        let desc = csi_pipeline(&CsiParams::default(), GstCompat::Modern).unwrap();
        assert!(desc.starts_with("nvarguscamerasrc sensor-id=0 ! "));
        assert!(desc.contains("width=(int)1920, height=(int)1080"));
        assert!(desc.contains("framerate=(fraction)30/1"));
        assert!(desc.ends_with("appsink drop=1, max-buffers=1"));
    }

    #[test]
    fn legacy_compat_only_drops() {
        let desc = csi_pipeline(&CsiParams::default(), GstCompat::Legacy).unwrap();
        assert!(desc.ends_with("appsink drop=1"));
    }

    #[test]
    fn flip_method_out_of_range() {
        let params = CsiParams {
            flip_method: 6,
            ..CsiParams::default()
        };
        assert!(csi_pipeline(&params, GstCompat::Modern).is_err());
    }

    #[test]
    fn v4l2_fallback() {
        assert_eq!(
            v4l2_pipeline("/dev/video1", 1280, 720),
            "v4l2src device=/dev/video1 ! video/x-raw, width=(int)1280, height=(int)720 ! \
             videoconvert ! video/x-raw, format=(string)BGR ! appsink drop=1"
        );
    }
}
