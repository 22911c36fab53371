use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::capture::FeedId;
use crate::inference::Detection;

const PALETTE: &[[u8; 3]] = &[
    [0, 255, 0],
    [255, 64, 64],
    [64, 160, 255],
    [255, 200, 0],
    [200, 0, 255],
    [0, 220, 220],
];

/// Side of one font cell in font pixels
const GLYPH: u32 = 8;
/// Gap around text on its backdrop, in font pixels
const PAD: u32 = 2;
const TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const BACKDROP: Rgb<u8> = Rgb([0, 0, 0]);

/// Font scale for a tile: one step per 320 pixels of width.
fn text_scale(image: &RgbImage) -> u32 {
    (image.width() / 320).max(1)
}

fn text_width(text: &str, scale: u32) -> u32 {
    (text.chars().count() as u32).saturating_mul(GLYPH * scale)
}

/// Outline every detection, colored by class, with its label above the box.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let scale = text_scale(image);
    for det in detections {
        let clamp_x = |v: f32| v.max(0.0).min((w - 1) as f32) as u32;
        let clamp_y = |v: f32| v.max(0.0).min((h - 1) as f32) as u32;
        let bbox = [
            clamp_x(det.bbox.x0),
            clamp_y(det.bbox.y0),
            clamp_x(det.bbox.x1),
            clamp_y(det.bbox.y1),
        ];
        let color = Rgb(PALETTE[det.class_id as usize % PALETTE.len()]);
        draw_rect(image, bbox, color, 2);

        let label = format!("{} {:.2}", det.label, det.confidence);
        let height = (GLYPH + PAD) * scale;
        // Above the box when there is room, otherwise just inside its top edge
        let top = if bbox[1] >= height { bbox[1] - height } else { bbox[1] };
        let backdrop = Rect::at(bbox[0] as i32, top as i32)
            .of_size(text_width(&label, scale) + PAD * scale, height);
        draw_filled_rect_mut(image, backdrop, color);
        let inset = (PAD * scale / 2) as i32;
        draw_text(image, &label, bbox[0] as i32 + inset, top as i32 + inset, scale, BACKDROP);
    }
}

/// Print `caption` in the top-left corner of a tile, one `" | "`-separated
/// field per line, white on a black backdrop.
pub fn overlay_caption(image: &mut RgbImage, caption: &str) {
    if image.width() == 0 || image.height() == 0 || caption.is_empty() {
        return;
    }
    let scale = text_scale(image);
    let line_height = (GLYPH + PAD) * scale;
    let lines: Vec<&str> = caption.split(" | ").collect();
    let widest = lines.iter().map(|l| text_width(l, scale)).max().unwrap_or(0);

    let backdrop = Rect::at(0, 0).of_size(
        widest + 2 * PAD * scale,
        line_height * lines.len() as u32 + PAD * scale,
    );
    draw_filled_rect_mut(image, backdrop, BACKDROP);

    let margin = (PAD * scale) as i32;
    for (i, line) in lines.iter().enumerate() {
        let y = margin + (i as u32 * line_height) as i32;
        draw_text(image, line, margin, y, scale, TEXT);
    }
}

/// Render `text` in an 8x8 bitmap font, each font pixel `scale` image pixels
/// square. Characters outside the font leave a blank cell. Anything past the
/// image edges is clipped.
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let advance = (GLYPH * scale) as i32;
    let mut left = x;
    for ch in text.chars() {
        if left >= image.width() as i32 {
            break;
        }
        if let Some(glyph) = BASIC_FONTS.get(ch) {
            for (row, bits) in glyph.iter().enumerate() {
                let top = y + row as i32 * scale as i32;
                for col in 0..GLYPH {
                    // Bit 0 is the leftmost pixel
                    if bits & (1 << col) != 0 {
                        let px = Rect::at(left + (col * scale) as i32, top).of_size(scale, scale);
                        draw_filled_rect_mut(image, px, color);
                    }
                }
            }
        }
        left = left.saturating_add(advance);
    }
}

/// Draw a rectangle border with given thickness.
pub fn draw_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

/// Overlay text for one feed tile.
///
/// `display_fps` is the instantaneous rate between consecutive display calls
/// for this feed, not the windowed throughput printed in statistics lines.
pub fn caption(feed: FeedId, frame: u64, detections: usize, display_fps: Option<f64>) -> String {
    match display_fps {
        Some(fps) => format!(
            "{feed} - Frame {frame} | Detections: {detections} | FPS: {fps:.1}"
        ),
        None => format!("{feed} - Frame {frame} | Detections: {detections}"),
    }
}
