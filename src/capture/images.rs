//! Directory-of-stills source

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use super::source::{CaptureError, CaptureHandle, CaptureSource};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn new(dir: PathBuf, looping: bool) -> Self {
        Self { dir, looping }
    }
}

impl CaptureSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!("images {}", self.dir.display())
    }

    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let files = list_images(&self.dir)?;
        if files.is_empty() {
            return Err(CaptureError::OpenFailed(format!(
                "{}: no images found",
                self.dir.display()
            )));
        }
        Ok(Box::new(ImageSequenceHandle {
            files,
            next: 0,
            looping: self.looping,
        }))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

struct ImageSequenceHandle {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl CaptureHandle for ImageSequenceHandle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Err(CaptureError::EndOfStream);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        Ok(Some(image::open(path)?.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let img = RgbImage::from_pixel(3, 2, image::Rgb([i, i, i]));
            img.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    #[test]
    fn reads_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);

        let mut handle = ImageSequenceSource::new(dir.path().to_path_buf(), false)
            .open()
            .unwrap();
        assert_eq!(handle.read().unwrap().unwrap().get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(handle.read().unwrap().unwrap().get_pixel(0, 0).0, [1, 1, 1]);
        assert!(matches!(handle.read(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn looping_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 1);

        let mut handle = ImageSequenceSource::new(dir.path().to_path_buf(), true)
            .open()
            .unwrap();
        for _ in 0..3 {
            assert!(handle.read().unwrap().is_some());
        }
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageSequenceSource::new(dir.path().to_path_buf(), false);
        assert!(matches!(source.open(), Err(CaptureError::OpenFailed(_))));
    }
}
