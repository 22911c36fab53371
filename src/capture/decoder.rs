use image::RgbImage;
use jpeg_decoder::Decoder;

use super::frame::PixelFormat;
use super::source::CaptureError;

/// Decode a raw device buffer into an RGB image.
pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<RgbImage, CaptureError> {
    let pixels = match format {
        PixelFormat::Mjpeg => return decode_mjpeg(data),
        PixelFormat::Rgb24 => {
            // Already in RGB format
            expect_len(data, width, height, 3)?;
            data[..(width * height * 3) as usize].to_vec()
        }
        PixelFormat::Bgr24 => {
            expect_len(data, width, height, 3)?;
            let mut rgb = data[..(width * height * 3) as usize].to_vec();
            for px in rgb.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            rgb
        }
        PixelFormat::Yuyv4 => {
            expect_len(data, width, height, 2)?;
            yuyv_to_rgb(&data[..(width * height * 2) as usize])
        }
    };

    RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        CaptureError::ReadFailed("decoded buffer does not match frame size".into())
    })
}

fn decode_mjpeg(data: &[u8]) -> Result<RgbImage, CaptureError> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::ReadFailed(format!("jpeg decode: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::ReadFailed("jpeg decoder produced no header".into()))?;

    let rgb = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels,
        jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "jpeg pixel format {other:?}"
            )))
        }
    };

    RgbImage::from_raw(info.width as u32, info.height as u32, rgb)
        .ok_or_else(|| CaptureError::ReadFailed("jpeg buffer does not match header size".into()))
}

fn expect_len(data: &[u8], width: u32, height: u32, bpp: u32) -> Result<(), CaptureError> {
    let expected = (width * height * bpp) as usize;
    if data.len() < expected {
        return Err(CaptureError::ReadFailed(format!(
            "short frame: got {} bytes, expected {expected}",
            data.len()
        )));
    }
    Ok(())
}

/// BT.601 YUYV (4:2:2) to packed RGB.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    rgb
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped_to_rgb() {
        let img = decode_frame(&[1, 2, 3, 4, 5, 6], PixelFormat::Bgr24, 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(img.get_pixel(1, 0).0, [6, 5, 4]);
    }

    #[test]
    fn yuyv_grey_stays_grey() {
        // Y=126, U=V=128 is mid grey
        let img = decode_frame(&[126, 128, 126, 128], PixelFormat::Yuyv4, 2, 1).unwrap();
        let px = img.get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(img.dimensions(), (2, 1));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = decode_frame(&[0; 5], PixelFormat::Rgb24, 2, 1).unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailed(_)));
    }

    #[test]
    fn mjpeg_round_trips_through_image_encoder() {
        let src = RgbImage::from_pixel(8, 4, image::Rgb([200, 40, 40]));
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 95)
            .encode_image(&src)
            .unwrap();

        let img = decode_frame(&encoded, PixelFormat::Mjpeg, 0, 0).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
        let px = img.get_pixel(3, 2).0;
        assert!(px[0] > 150 && px[1] < 90);
    }
}
