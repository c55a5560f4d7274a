//! Detector capability
//!
//! The inference engine is a black box: raster + rotation + threshold in,
//! ordered detections + timing out. The pipeline only ever calls a detector
//! from its single worker thread, so implementations need `Send` but not
//! `Sync`.

use image::RgbaImage;
use thiserror::Error;

use super::types::{Detection, DetectorOptions};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector initialization failed: {0}")]
    Init(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unsupported input: {0}")]
    Input(String),
}

/// Output of one `detect` call.
#[derive(Clone, Debug, PartialEq)]
pub struct Detections {
    pub results: Vec<Detection>,
    pub inference_ms: u64,
}

impl Detections {
    pub fn new(results: Vec<Detection>, inference_ms: u64) -> Self {
        Self {
            results,
            inference_ms,
        }
    }
}

pub trait Detector: Send {
    /// Run inference on `image`, which is `rotation_degrees` away from upright.
    /// Boxes are returned in upright (rotated) pixel coordinates.
    fn detect(
        &mut self,
        image: &RgbaImage,
        rotation_degrees: i32,
        threshold: f32,
    ) -> Result<Detections, DetectorError>;

    /// Discard internal model state so the next `detect` is unaffected by
    /// any previous configuration.
    fn reset(&mut self);

    fn name(&self) -> &str {
        "detector"
    }
}

/// Builds detectors on demand. Called on the worker thread whenever the
/// current detector has been discarded (first frame, threshold change).
pub trait DetectorFactory: Send {
    fn build(&mut self, options: &DetectorOptions) -> Result<Box<dyn Detector>, DetectorError>;
}

impl<F> DetectorFactory for F
where
    F: FnMut(&DetectorOptions) -> Result<Box<dyn Detector>, DetectorError> + Send,
{
    fn build(&mut self, options: &DetectorOptions) -> Result<Box<dyn Detector>, DetectorError> {
        self(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;

    struct Fixed(f32);

    impl Detector for Fixed {
        fn detect(
            &mut self,
            image: &RgbaImage,
            _rotation_degrees: i32,
            threshold: f32,
        ) -> Result<Detections, DetectorError> {
            let det = Detection::new(
                BBox::new(0.0, 0.0, image.width() as f32, image.height() as f32),
                "frame",
                self.0,
            );
            let results = if det.score() >= threshold {
                vec![det]
            } else {
                vec![]
            };
            Ok(Detections::new(results, 1))
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn closure_factory_builds_boxed_detector() {
        let mut factory = |opts: &DetectorOptions| -> Result<Box<dyn Detector>, DetectorError> {
            Ok(Box::new(Fixed(opts.threshold + 0.1)))
        };
        let mut det = factory.build(&DetectorOptions::default()).unwrap();
        let img = RgbaImage::new(4, 3);
        let out = det.detect(&img, 0, 0.5).unwrap();
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].bbox().right, 4.0);

        let out = det.detect(&img, 0, 0.7).unwrap();
        assert!(out.results.is_empty());
    }
}
