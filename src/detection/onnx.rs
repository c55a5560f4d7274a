//! ONNX Runtime detector backend (YOLOv8 detect models)

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{imageops, RgbaImage};
use ort::{GraphOptimizationLevel, Session};

use super::detector::{Detections, Detector, DetectorError};
use super::types::DetectorOptions;
use super::yolo::{Letterbox, YoloDecoder};

pub struct OnnxDetector {
    model_path: PathBuf,
    session: Session,
    input_name: String,
    width: u32,
    height: u32,
    decoder: YoloDecoder,
    options: DetectorOptions,
    upright: Option<RgbaImage>,
}

impl OnnxDetector {
    pub fn new(
        model_path: &Path,
        decoder: YoloDecoder,
        options: &DetectorOptions,
    ) -> Result<Self, DetectorError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(options.num_threads.max(1)))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| DetectorError::Init(format!("{}: {}", model_path.display(), e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DetectorError::Init("model has no inputs".into()))?;
        let input_name = input.name.clone();

        // NCHW; dynamic dims come back as -1
        let (width, height) = match input.input_type.tensor_dimensions() {
            Some(dims) if dims.len() == 4 && dims[2] > 0 && dims[3] > 0 => {
                (dims[3] as u32, dims[2] as u32)
            }
            _ => (640, 640),
        };

        log::info!(
            "✅ model loaded: {} (input {} {}x{}, threads {})",
            model_path.display(),
            input_name,
            width,
            height,
            options.num_threads
        );

        Ok(Self {
            model_path: model_path.to_path_buf(),
            session,
            input_name,
            width,
            height,
            decoder,
            options: options.clone(),
            upright: None,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

/// Rotate into upright orientation; the rotated copy lives in `scratch`.
fn rotate_upright<'a>(
    scratch: &'a mut Option<RgbaImage>,
    image: &'a RgbaImage,
    rotation_degrees: i32,
) -> &'a RgbaImage {
    let rotated = match rotation_degrees.rem_euclid(360) {
        90 => Some(imageops::rotate90(image)),
        180 => Some(imageops::rotate180(image)),
        270 => Some(imageops::rotate270(image)),
        _ => None,
    };
    match rotated {
        Some(img) => scratch.insert(img),
        None => image,
    }
}

impl Detector for OnnxDetector {
    fn detect(
        &mut self,
        image: &RgbaImage,
        rotation_degrees: i32,
        threshold: f32,
    ) -> Result<Detections, DetectorError> {
        let start = Instant::now();
        let (width, height) = (self.width, self.height);
        let upright = rotate_upright(&mut self.upright, image, rotation_degrees);
        let (w0, h0) = upright.dimensions();
        let letterbox = Letterbox::build(upright, width, height)?;

        let inputs = ort::inputs![self.input_name.as_str() => letterbox.tensor.view()]
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let output = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let results = self
            .decoder
            .decode(output, w0, h0, letterbox.ratio, threshold)?;
        let inference_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "{} detections in {}ms (threshold {:.2}, max {})",
            results.len(),
            inference_ms,
            threshold,
            self.options.max_results
        );
        Ok(Detections::new(results, inference_ms))
    }

    fn reset(&mut self) {
        self.upright = None;
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
