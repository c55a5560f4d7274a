//! Still-image directory replayed as a camera.
//!
//! Files are read in name order and handed out as RGBA frames carrying a
//! fixed sensor rotation. Non-image files are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CameraError, FrameSource};
use crate::pipeline::CameraFrame;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    rotation_degrees: i32,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, rotation_degrees: i32) -> Result<Self, CameraError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir).map_err(|e| CameraError::from_io(&dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        if files.is_empty() {
            return Err(CameraError::Empty(dir));
        }
        files.sort();

        log::info!("📷 {} frames from {}", files.len(), dir.display());
        Ok(Self {
            dir,
            files,
            cursor: 0,
            rotation_degrees,
            looping: false,
        })
    }

    /// Start over from the first file after the last one.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<CameraFrame>, CameraError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;

        let image = image::open(path).map_err(|source| CameraError::Decode {
            path: path.clone(),
            source,
        })?;
        Ok(Some(CameraFrame::from_image(image.into_rgba8(), self.rotation_degrees)))
    }

    fn name(&self) -> String {
        self.dir.display().to_string()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbaImage::from_pixel(6, 4, Rgba([shade, shade, shade, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn replays_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 90).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height, first.rotation_degrees), (6, 4, 90));
        assert_eq!(first.pixels[0], 10);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.pixels[0], 20);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn looping_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "only.png", 7);
        let mut source = ImageSequenceSource::open(dir.path(), 0).unwrap().looping(true);
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 0),
            Err(CameraError::Empty(_))
        ));
    }

    #[test]
    fn missing_directory_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path().join("nope"), 0),
            Err(CameraError::Open { .. })
        ));
    }
}
