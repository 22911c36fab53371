//! Fixed-layout grid composition of 1-4 annotated frames.

use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("cannot compose {0} images (supported: 1-4)")]
    UnsupportedLayout(usize),
}

/// Grid arrangement, selected from the number of input images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Identity
    Single,
    /// Side by side
    Pair,
    /// Two on top, the third stretched across the bottom
    Triple,
    /// 2x2 grid
    Quad,
}

impl Layout {
    pub fn for_count(count: usize) -> Result<Self, ComposeError> {
        match count {
            1 => Ok(Layout::Single),
            2 => Ok(Layout::Pair),
            3 => Ok(Layout::Triple),
            4 => Ok(Layout::Quad),
            n => Err(ComposeError::UnsupportedLayout(n)),
        }
    }

    pub const MAX_IMAGES: usize = 4;
}

/// Builds one composite image per tick
#[derive(Debug, Clone, Copy)]
pub struct Composer {
    max_width: u32,
}

impl Composer {
    pub fn new(max_width: u32) -> Self {
        Self {
            max_width: max_width.max(1),
        }
    }

    /// Arrange `images` (in feed order) and shrink the result to `max_width`.
    pub fn compose(&self, mut images: Vec<RgbImage>) -> Result<RgbImage, ComposeError> {
        let layout = Layout::for_count(images.len())?;

        let combined = match layout {
            Layout::Single => images.remove(0),
            Layout::Pair => hconcat(&images),
            Layout::Triple => {
                let top = hconcat(&images[..2]);
                vconcat(top, &images[2])
            }
            Layout::Quad => {
                let top = hconcat(&images[..2]);
                let bottom = hconcat(&images[2..]);
                vconcat(top, &bottom)
            }
        };

        Ok(limit_width(combined, self.max_width))
    }
}

/// Concatenate left to right. Every image is first scaled (aspect preserved)
/// to the height of the leftmost one.
fn hconcat(images: &[RgbImage]) -> RgbImage {
    let height = images[0].height();
    let resized: Vec<RgbImage> = images
        .iter()
        .map(|img| {
            if img.height() == height {
                img.clone()
            } else {
                let width = scaled(img.width(), height, img.height());
                imageops::resize(img, width, height, FilterType::Triangle)
            }
        })
        .collect();

    let total_width = resized.iter().map(RgbImage::width).sum();
    let mut out = RgbImage::new(total_width, height);
    let mut x = 0i64;
    for img in &resized {
        imageops::replace(&mut out, img, x, 0);
        x += img.width() as i64;
    }
    out
}

/// Stack `bottom` below `top`, stretching `bottom` horizontally to the width
/// of `top` while keeping its own height.
fn vconcat(top: RgbImage, bottom: &RgbImage) -> RgbImage {
    let width = top.width();
    let stretched;
    let bottom = if bottom.width() == width {
        bottom
    } else {
        stretched = imageops::resize(bottom, width, bottom.height(), FilterType::Triangle);
        &stretched
    };

    let mut out = RgbImage::new(width, top.height() + bottom.height());
    imageops::replace(&mut out, &top, 0, 0);
    imageops::replace(&mut out, bottom, 0, top.height() as i64);
    out
}

fn limit_width(image: RgbImage, max_width: u32) -> RgbImage {
    if image.width() <= max_width {
        return image;
    }
    let height = scaled(image.height(), max_width, image.width());
    imageops::resize(&image, max_width, height, FilterType::Triangle)
}

/// `value * num / den`, truncated, never below 1
fn scaled(value: u32, num: u32, den: u32) -> u32 {
    ((value as u64 * num as u64) / den.max(1) as u64).max(1) as u32
}
