//! Analysis worker: the only thread that touches the detector and the frame
//! buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use image::RgbaImage;

use super::frame::{CameraFrame, CaptureSnapshot, FrameBuffer, SnapshotCell};
use super::{Control, PipelineError, PipelineEvent, PipelineStats};
use crate::detection::{Detector, DetectorFactory, DetectorOptions, InferredFrame};

enum Flow {
    Continue,
    Stop,
}

pub(super) struct Worker {
    factory: Box<dyn DetectorFactory>,
    options: DetectorOptions,
    detector: Option<Box<dyn Detector>>,
    buffer: FrameBuffer,
    /// raster of a replaced snapshot nobody else holds
    spare: Option<RgbaImage>,
    snapshots: SnapshotCell,
    events: Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub(super) fn new(
        factory: Box<dyn DetectorFactory>,
        options: DetectorOptions,
        snapshots: SnapshotCell,
        events: Sender<PipelineEvent>,
        stats: Arc<PipelineStats>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            factory,
            options,
            detector: None,
            buffer: FrameBuffer::new(),
            spare: None,
            snapshots,
            events,
            stats,
            running,
        }
    }

    pub(super) fn run(mut self, frames: Receiver<CameraFrame>, control: Receiver<Control>) {
        log::info!(
            "🔍 analysis worker started (threshold {:.2})",
            self.options.threshold
        );

        loop {
            let flow = select! {
                recv(control) -> msg => match msg {
                    Ok(msg) => self.apply(msg),
                    Err(_) => Flow::Stop,
                },
                recv(frames) -> frame => match frame {
                    Ok(frame) => {
                        // reconfiguration sent before this frame applies to it
                        match self.drain(&control) {
                            Flow::Continue => self.process(frame),
                            Flow::Stop => Flow::Stop,
                        }
                    }
                    Err(_) => Flow::Stop,
                },
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        self.running.store(false, Ordering::Release);
        self.release_detector();
        log::info!("analysis worker stopped");
    }

    fn drain(&mut self, control: &Receiver<Control>) -> Flow {
        for msg in control.try_iter() {
            if let Flow::Stop = self.apply(msg) {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn apply(&mut self, msg: Control) -> Flow {
        match msg {
            Control::SetThreshold(threshold) => {
                log::info!("🎛️ threshold -> {:.2}, detector will be rebuilt", threshold);
                self.options.threshold = threshold;
                self.release_detector();
                Flow::Continue
            }
            Control::Shutdown => Flow::Stop,
        }
    }

    fn release_detector(&mut self) {
        if let Some(mut detector) = self.detector.take() {
            detector.reset();
        }
    }

    fn process(&mut self, frame: CameraFrame) -> Flow {
        let rotation = frame.rotation_degrees;
        let facing = frame.facing;

        if self.detector.is_none() {
            match self.factory.build(&self.options) {
                Ok(detector) => {
                    self.stats.detector_builds.fetch_add(1, Ordering::Relaxed);
                    log::info!(
                        "✅ detector '{}' ready (threshold {:.2})",
                        detector.name(),
                        self.options.threshold
                    );
                    self.detector = Some(detector);
                }
                Err(e) => {
                    log::error!("❌ detector build failed: {}", e);
                    let _ = self.events.send(PipelineEvent::Error(e.to_string()));
                    self.stats.failed.fetch_add(1, Ordering::Release);
                    return Flow::Continue;
                }
            }
        }
        let Some(detector) = self.detector.as_mut() else {
            return Flow::Continue;
        };

        let image = match self.buffer.copy_from(&frame) {
            Ok(image) => image,
            Err(e @ PipelineError::FrameSizeMismatch { .. }) => {
                log::error!("❌ {}", e);
                let _ = self.events.send(PipelineEvent::Error(e.to_string()));
                self.stats.failed.fetch_add(1, Ordering::Release);
                return Flow::Stop;
            }
            Err(e) => {
                log::warn!("⚠️ frame skipped: {}", e);
                let _ = self.events.send(PipelineEvent::Error(e.to_string()));
                self.stats.failed.fetch_add(1, Ordering::Release);
                return Flow::Continue;
            }
        };
        // raw frame released before inference
        drop(frame);

        match detector.detect(image, rotation, self.options.threshold) {
            Ok(out) => {
                let (image_width, image_height) = upright_dimensions(image.dimensions(), rotation);
                let replaced = self.snapshots.publish(CaptureSnapshot {
                    frame: CaptureSnapshot::raster(self.spare.take(), image),
                    results: out.results.clone(),
                    rotation_degrees: rotation,
                    facing,
                    inference_ms: out.inference_ms,
                });
                self.spare = replaced
                    .and_then(|old| Arc::try_unwrap(old).ok())
                    .map(|old| old.frame);
                let _ = self.events.send(PipelineEvent::Results(InferredFrame {
                    results: out.results,
                    inference_ms: out.inference_ms,
                    image_height,
                    image_width,
                }));
                self.stats.analyzed.fetch_add(1, Ordering::Release);
            }
            Err(e) => {
                log::warn!("⚠️ inference failed: {}", e);
                let _ = self.events.send(PipelineEvent::Error(e.to_string()));
                self.stats.failed.fetch_add(1, Ordering::Release);
            }
        }
        Flow::Continue
    }
}

/// Dimensions of the raster the detector's boxes refer to.
fn upright_dimensions((width, height): (u32, u32), rotation_degrees: i32) -> (u32, u32) {
    match rotation_degrees.rem_euclid(360) {
        90 | 270 => (height, width),
        _ => (width, height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert_eq!(upright_dimensions((640, 480), 0), (640, 480));
        assert_eq!(upright_dimensions((640, 480), 90), (480, 640));
        assert_eq!(upright_dimensions((640, 480), -90), (480, 640));
        assert_eq!(upright_dimensions((640, 480), 180), (640, 480));
    }
}
