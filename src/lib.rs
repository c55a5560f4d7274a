// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod capture; // screenshot persistence
pub mod config; // CLI + JSON settings
pub mod controls; // threshold slider
pub mod detection; // detector contract, YOLO decoding, ONNX backend
pub mod input; // camera sources
pub mod pipeline; // frame hand-off + analysis worker
pub mod renderer; // result compositing
pub mod session; // camera → pipeline → overlay wiring
pub mod utils;

pub use crate::capture::{CaptureStore, JpegDirectoryStore, PersistenceError};
pub use crate::config::{AppConfig, Args};
pub use crate::controls::{percent_label, threshold_of, Overlay, ThresholdController};
pub use crate::detection::{
    BBox, Detection, Detections, Detector, DetectorError, DetectorFactory, DetectorOptions,
    InferredFrame,
};
pub use crate::input::{CameraError, CameraFacing, CameraFeed, FrameSource, ImageSequenceSource};
pub use crate::pipeline::{
    CameraFrame, CaptureSnapshot, ControlHandle, DetectorListener, FrameAnalysisPipeline,
    FrameSubmitter, PipelineError, PipelineEvent, StatsSnapshot,
};
pub use crate::renderer::{color_of, ResultRenderer};
pub use crate::session::{
    CameraOpener, CaptureError, OverlayState, Session, SessionConfig, SessionError,
};
