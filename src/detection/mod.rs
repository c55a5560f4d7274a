/// Detection system
///
/// - Detector: black-box inference capability (trait)
/// - YoloDecoder: YOLOv8 output decoding + NMS
/// - OnnxDetector: ONNX Runtime backend (feature `onnx`)
pub mod detector;
pub mod types;
pub mod yolo;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use detector::{Detections, Detector, DetectorError, DetectorFactory};
pub use types::{BBox, Detection, DetectorOptions, InferredFrame};
pub use yolo::{load_labels, Letterbox, YoloDecoder, COCO_LABELS};

#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
