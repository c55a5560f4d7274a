//! Frame data owned by the analysis worker.
//!
//! `CameraFrame` is the raw hand-off from the camera context, `FrameBuffer`
//! the reusable raster the detector reads, `CaptureSnapshot` the copy
//! published after every successful inference.

use std::sync::{Arc, Mutex};

use image::RgbaImage;

use super::PipelineError;
use crate::detection::Detection;
use crate::input::CameraFacing;

/// Raw RGBA8888 frame from the camera.
#[derive(Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: i32,
    /// Camera that produced the frame; decides the screenshot rotation.
    pub facing: CameraFacing,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("facing", &self.facing)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl CameraFrame {
    pub fn new(width: u32, height: u32, rotation_degrees: i32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rotation_degrees,
            facing: CameraFacing::default(),
            pixels,
        }
    }

    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    pub fn from_image(image: RgbaImage, rotation_degrees: i32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, rotation_degrees, image.into_raw())
    }
}

/// Single reusable raster, sized from the first frame.
#[derive(Default)]
pub struct FrameBuffer {
    image: Option<RgbaImage>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(|img| img.dimensions())
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    /// Copy `frame` into the buffer. Allocates only on the first call; a frame
    /// with different dimensions afterwards is a configuration error.
    pub fn copy_from(&mut self, frame: &CameraFrame) -> Result<&RgbaImage, PipelineError> {
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.pixels.len() < expected {
            return Err(PipelineError::ShortFrame {
                expected,
                actual: frame.pixels.len(),
            });
        }

        let image = self
            .image
            .get_or_insert_with(|| RgbaImage::new(frame.width, frame.height));
        if image.dimensions() != (frame.width, frame.height) {
            return Err(PipelineError::FrameSizeMismatch {
                expected: image.dimensions(),
                actual: (frame.width, frame.height),
            });
        }

        let dst: &mut [u8] = image;
        dst.copy_from_slice(&frame.pixels[..expected]);
        Ok(image)
    }
}

/// Most recent (frame, results) pair.
#[derive(Clone, Debug)]
pub struct CaptureSnapshot {
    pub frame: RgbaImage,
    pub results: Vec<Detection>,
    pub rotation_degrees: i32,
    pub facing: CameraFacing,
    pub inference_ms: u64,
}

impl CaptureSnapshot {
    /// Copy of `image` for publishing, reusing `spare` when it has the same
    /// size.
    pub fn raster(spare: Option<RgbaImage>, image: &RgbaImage) -> RgbaImage {
        match spare {
            Some(mut raster) if raster.dimensions() == image.dimensions() => {
                let dst: &mut [u8] = &mut raster;
                dst.copy_from_slice(image.as_raw());
                raster
            }
            _ => image.clone(),
        }
    }
}

/// Copy-on-publish cell: the worker swaps in a fresh `Arc`, readers clone it.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Option<Arc<CaptureSnapshot>>>>,
}

impl SnapshotCell {
    /// Swap in `snapshot`, returning the one it replaced.
    pub fn publish(&self, snapshot: CaptureSnapshot) -> Option<Arc<CaptureSnapshot>> {
        let snapshot = Some(Arc::new(snapshot));
        match self.inner.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, snapshot),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), snapshot),
        }
    }

    pub fn latest(&self) -> Option<Arc<CaptureSnapshot>> {
        match self.inner.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(w: u32, h: u32, value: u8) -> CameraFrame {
        CameraFrame::new(w, h, 0, vec![value; (w * h * 4) as usize])
    }

    #[test]
    fn buffer_is_sized_by_first_frame() {
        let mut buf = FrameBuffer::new();
        assert!(buf.dimensions().is_none());
        buf.copy_from(&frame(4, 2, 7)).unwrap();
        assert_eq!(buf.dimensions(), Some((4, 2)));
        let img = buf.copy_from(&frame(4, 2, 9)).unwrap();
        assert_eq!(*img.get_pixel(3, 1), Rgba([9, 9, 9, 9]));
    }

    #[test]
    fn buffer_rejects_size_change() {
        let mut buf = FrameBuffer::new();
        buf.copy_from(&frame(4, 2, 0)).unwrap();
        let err = buf.copy_from(&frame(2, 4, 0)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FrameSizeMismatch {
                expected: (4, 2),
                actual: (2, 4)
            }
        ));
    }

    #[test]
    fn buffer_rejects_short_frames() {
        let mut buf = FrameBuffer::new();
        let short = CameraFrame::new(4, 4, 0, vec![0; 10]);
        assert!(matches!(
            buf.copy_from(&short),
            Err(PipelineError::ShortFrame { .. })
        ));
        assert!(buf.dimensions().is_none());
    }

    #[test]
    fn snapshot_cell_returns_latest() {
        let cell = SnapshotCell::default();
        assert!(cell.latest().is_none());
        for ms in [3, 5] {
            cell.publish(CaptureSnapshot {
                frame: RgbaImage::new(1, 1),
                results: vec![],
                rotation_degrees: 0,
                facing: CameraFacing::Back,
                inference_ms: ms,
            });
        }
        assert_eq!(cell.latest().unwrap().inference_ms, 5);
    }

    #[test]
    fn publish_hands_back_replaced_snapshot() {
        let cell = SnapshotCell::default();
        let snapshot = |ms| CaptureSnapshot {
            frame: RgbaImage::new(2, 2),
            results: vec![],
            rotation_degrees: 0,
            facing: CameraFacing::Front,
            inference_ms: ms,
        };
        assert!(cell.publish(snapshot(1)).is_none());
        let old = cell.publish(snapshot(2)).unwrap();
        assert_eq!(old.inference_ms, 1);
        assert!(Arc::try_unwrap(old).is_ok());
    }

    #[test]
    fn raster_reuses_spare_of_same_size() {
        let image = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        let spare = RgbaImage::new(3, 2);
        let spare_ptr = spare.as_raw().as_ptr();
        let copy = CaptureSnapshot::raster(Some(spare), &image);
        assert_eq!(copy, image);
        assert_eq!(copy.as_raw().as_ptr(), spare_ptr);

        let resized = CaptureSnapshot::raster(Some(RgbaImage::new(2, 2)), &image);
        assert_eq!(resized, image);
        assert_eq!(CaptureSnapshot::raster(None, &image), image);
    }
}
