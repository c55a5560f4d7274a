/// Detection data structures
///
/// Values handed from the detector to the pipeline, the presentation
/// listener and the renderer.
use serde::{Deserialize, Serialize};

// ========== Constants ==========

/// Default confidence threshold (UI level 5).
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default number of detections kept per frame.
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// Default inference thread count.
pub const DEFAULT_NUM_THREADS: usize = 2;

// ========== Data structures ==========

/// Bounding box in source-raster pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let l = self.left.max(other.left);
        let r = self.right.min(other.right);
        let t = self.top.max(other.top);
        let b = self.bottom.min(other.bottom);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected object. Immutable once produced for a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    bbox: BBox,
    label: String,
    score: f32,
}

impl Detection {
    pub fn new(bbox: BBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score: score.clamp(0.0, 1.0),
        }
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    /// Text drawn next to the box, e.g. `cup 0.87`.
    pub fn display_text(&self) -> String {
        format!("{} {:.2}", self.label, self.score)
    }
}

/// Inference result (worker thread → presentation thread)
#[derive(Clone, Debug, PartialEq)]
pub struct InferredFrame {
    pub results: Vec<Detection>,
    pub inference_ms: u64,
    pub image_height: u32,
    pub image_width: u32,
}

/// Detector construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    pub threshold: f32,
    pub max_results: usize,
    pub num_threads: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            num_threads: DEFAULT_NUM_THREADS,
        }
    }
}

impl DetectorOptions {
    pub fn with_threshold(&self, threshold: f32) -> Self {
        Self {
            threshold,
            ..self.clone()
        }
    }
}
