//! YOLOv8 input/output handling
//!
//! Letterbox preprocessing into an NCHW tensor and decoding of the raw
//! `[batch, 4 + nc, anchors]` output into ordered detections. Independent of
//! the inference engine so it can be driven by any backend.

use std::path::Path;

use fast_image_resize as fr;
use image::RgbaImage;
use ndarray::{s, Array, ArrayViewD, Axis, Ix4};

use super::detector::DetectorError;
use super::types::{BBox, Detection};

const CXYWH_OFFSET: usize = 4;

/// Letterbox pad value (same grey the model was trained with).
const PAD_VALUE: f32 = 144.0 / 255.0;

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Read a newline-separated label file. Blank lines are skipped.
pub fn load_labels(path: &Path) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Letterboxed model input.
pub struct Letterbox {
    pub tensor: Array<f32, Ix4>,
    /// model pixels per source pixel
    pub ratio: f32,
}

impl Letterbox {
    /// Resize `image` keeping aspect ratio into the top-left corner of a
    /// `width` x `height` canvas and convert to normalized NCHW.
    pub fn build(image: &RgbaImage, width: u32, height: u32) -> Result<Self, DetectorError> {
        let (w0, h0) = image.dimensions();
        if w0 == 0 || h0 == 0 {
            return Err(DetectorError::Input("empty image".into()));
        }
        let ratio = (width as f32 / w0 as f32).min(height as f32 / h0 as f32);
        let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, width);
        let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, height);

        let src = fr::images::Image::from_vec_u8(w0, h0, image.as_raw().clone(), fr::PixelType::U8x4)
            .map_err(|e| DetectorError::Input(e.to_string()))?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x4);
        let mut resizer = fr::Resizer::new();
        resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| DetectorError::Input(e.to_string()))?;

        let mut tensor = Array::from_elem((1, 3, height as usize, width as usize), PAD_VALUE);
        let row = w_new as usize * 4;
        for (y, line) in dst.buffer().chunks_exact(row).enumerate() {
            for (x, px) in line.chunks_exact(4).enumerate() {
                tensor[[0, 0, y, x]] = px[0] as f32 / 255.0;
                tensor[[0, 1, y, x]] = px[1] as f32 / 255.0;
                tensor[[0, 2, y, x]] = px[2] as f32 / 255.0;
            }
        }

        Ok(Self { tensor, ratio })
    }
}

/// Sort by score and drop boxes overlapping a better one by more than
/// `iou_threshold`. Class-agnostic.
pub fn non_max_suppression(xs: &mut Vec<(Detection, usize)>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.0.score().total_cmp(&a.0.score()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].0.bbox().iou(xs[index].0.bbox());
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[derive(Clone, Debug)]
pub struct YoloDecoder {
    labels: Vec<String>,
    iou: f32,
    max_results: usize,
}

impl YoloDecoder {
    pub fn new(labels: Vec<String>, iou: f32, max_results: usize) -> Self {
        Self {
            labels,
            iou,
            max_results,
        }
    }

    pub fn coco(max_results: usize) -> Self {
        Self::new(
            COCO_LABELS.iter().map(|s| s.to_string()).collect(),
            0.45,
            max_results,
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn label_of(&self, id: usize) -> String {
        self.labels
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", id))
    }

    /// Decode the first batch entry of `output` for a source image of
    /// `width` x `height` letterboxed with `ratio`.
    pub fn decode(
        &self,
        output: ArrayViewD<'_, f32>,
        width: u32,
        height: u32,
        ratio: f32,
        threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError> {
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
            return Err(DetectorError::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        if ratio <= 0.0 {
            return Err(DetectorError::Inference("invalid letterbox ratio".into()));
        }
        let w0 = width as f32;
        let h0 = height as f32;

        let anchors = output.index_axis(Axis(0), 0);
        let mut data = Vec::new();
        for pred in anchors.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..]);

            let Some((id, &confidence)) = clss
                .iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };
            if confidence < threshold {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let rect = BBox::new(
                (cx - w / 2.).clamp(0.0, w0),
                (cy - h / 2.).clamp(0.0, h0),
                (cx + w / 2.).clamp(0.0, w0),
                (cy + h / 2.).clamp(0.0, h0),
            );
            data.push((Detection::new(rect, self.label_of(id), confidence), id));
        }

        non_max_suppression(&mut data, self.iou);
        data.truncate(self.max_results);
        Ok(data.into_iter().map(|(d, _)| d).collect())
    }
}
