use argus::display::{ComposeError, Composer};
use image::{Rgb, RgbImage};

fn frames(n: usize, w: u32, h: u32) -> Vec<RgbImage> {
    (0..n)
        .map(|i| RgbImage::from_pixel(w, h, Rgb([(i * 60) as u8, 0, 0])))
        .collect()
}

#[test]
fn grid_dimensions_for_equal_frames() {
    let composer = Composer::new(1920);
    let dims = |n| composer.compose(frames(n, 320, 240)).unwrap().dimensions();

    assert_eq!(dims(1), (320, 240));
    assert_eq!(dims(2), (640, 240));
    assert_eq!(dims(3), (640, 480));
    assert_eq!(dims(4), (640, 480));
}

#[test]
fn triple_stretches_bottom_row_to_top_width() {
    let out = Composer::new(1920).compose(frames(3, 100, 50)).unwrap();
    assert_eq!(out.dimensions(), (200, 100));
    // Third frame fills the whole bottom row
    for x in [0, 199] {
        let [r, g, b] = out.get_pixel(x, 75).0;
        assert!(r.abs_diff(120) <= 1 && g == 0 && b == 0);
    }
}

#[test]
fn wide_composites_are_scaled_to_max_width() {
    let out = Composer::new(1920).compose(frames(4, 1280, 720)).unwrap();
    assert_eq!(out.dimensions(), (1920, 1080));
}

#[test]
fn narrow_composites_are_left_alone() {
    let out = Composer::new(1920).compose(frames(2, 640, 480)).unwrap();
    assert_eq!(out.dimensions(), (1280, 480));
}

#[test]
fn row_heights_follow_first_frame() {
    let images = vec![RgbImage::new(100, 50), RgbImage::new(100, 100)];
    let out = Composer::new(1920).compose(images).unwrap();
    assert_eq!(out.dimensions(), (150, 50));
}

#[test]
fn unsupported_counts_are_rejected() {
    let composer = Composer::new(1920);
    assert_eq!(
        composer.compose(Vec::new()).unwrap_err(),
        ComposeError::UnsupportedLayout(0)
    );
    assert_eq!(
        composer.compose(frames(5, 8, 8)).unwrap_err(),
        ComposeError::UnsupportedLayout(5)
    );
}
