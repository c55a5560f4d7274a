//! Screenshot persistence
//!
//! `JpegDirectoryStore` writes `{epoch_millis}.jpg` at quality 100 into a
//! directory (the user's Pictures folder by default).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 100;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Where composited screenshots go.
pub trait CaptureStore: Send {
    fn save(&self, image: &RgbaImage) -> Result<PathBuf, PersistenceError>;
}

pub struct JpegDirectoryStore {
    dir: PathBuf,
}

impl Default for JpegDirectoryStore {
    fn default() -> Self {
        Self::new(default_capture_dir())
    }
}

impl JpegDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a capture taken now.
    pub fn file_name() -> String {
        format!("{}.jpg", chrono::Utc::now().timestamp_millis())
    }
}

impl CaptureStore for JpegDirectoryStore {
    fn save(&self, image: &RgbaImage) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name());
        let file = File::create(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;

        if let Err(e) = write_jpeg(image, file, &path) {
            // don't leave a truncated screenshot behind
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        log::info!("📸 saved {}", path.display());
        Ok(path)
    }
}

/// Encode `image` as a quality-100 JPEG. The buffered tail is flushed here so
/// a failed final write is reported instead of lost on drop.
fn write_jpeg<W: Write>(image: &RgbaImage, out: W, path: &Path) -> Result<(), PersistenceError> {
    // JPEG has no alpha
    let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut writer = BufWriter::new(out);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|source| PersistenceError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `~/Pictures` (or the platform equivalent), else the working directory.
pub fn default_capture_dir() -> PathBuf {
    dirs::picture_dir().unwrap_or_else(|| PathBuf::from("."))
}
