#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::RgbaImage;
use objcam_rs::input::{CameraError, FrameSource};
use objcam_rs::{
    BBox, CameraFrame, Detection, Detections, Detector, DetectorError, DetectorListener,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Solid frame whose first byte tags it.
pub fn frame(width: u32, height: u32, tag: u8) -> CameraFrame {
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    for px in pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    pixels[0] = tag;
    CameraFrame::new(width, height, 0, pixels)
}

pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Seen {
    Results {
        results: Vec<Detection>,
        image_height: u32,
        image_width: u32,
    },
    Error(String),
}

/// Listener that records everything in delivery order.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Seen>,
    pub threads: Vec<std::thread::ThreadId>,
}

impl DetectorListener for Recorder {
    fn on_results(
        &mut self,
        results: &[Detection],
        _inference_ms: u64,
        image_height: u32,
        image_width: u32,
    ) {
        self.threads.push(std::thread::current().id());
        self.events.push(Seen::Results {
            results: results.to_vec(),
            image_height,
            image_width,
        });
    }

    fn on_error(&mut self, message: &str) {
        self.threads.push(std::thread::current().id());
        self.events.push(Seen::Error(message.to_string()));
    }
}

/// Shared observations made by `ScriptedDetector` on the worker thread.
#[derive(Default)]
pub struct Probe {
    /// first byte of every frame analysed
    pub tags: Mutex<Vec<u8>>,
    /// threshold passed to every detect call
    pub thresholds: Mutex<Vec<f32>>,
    pub resets: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Probe {
    pub fn tags(&self) -> Vec<u8> {
        self.tags.lock().unwrap().clone()
    }

    pub fn thresholds(&self) -> Vec<f32> {
        self.thresholds.lock().unwrap().clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

/// Detector returning fixed results, optionally failing on chosen calls or
/// blocking until released.
pub struct ScriptedDetector {
    pub probe: Arc<Probe>,
    pub results: Vec<Detection>,
    pub fail_on: Vec<usize>,
    pub started: Option<crossbeam_channel::Sender<()>>,
    pub gate: Option<crossbeam_channel::Receiver<()>>,
}

impl ScriptedDetector {
    pub fn new(probe: Arc<Probe>, results: Vec<Detection>) -> Self {
        Self {
            probe,
            results,
            fail_on: Vec::new(),
            started: None,
            gate: None,
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(
        &mut self,
        image: &RgbaImage,
        _rotation_degrees: i32,
        threshold: f32,
    ) -> Result<Detections, DetectorError> {
        let call = self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe.tags.lock().unwrap().push(image.as_raw()[0]);
        self.probe.thresholds.lock().unwrap().push(threshold);
        if let Some(started) = &self.started {
            let _ = started.send(());
        }
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(TIMEOUT);
        }
        if self.fail_on.contains(&call) {
            return Err(DetectorError::Inference(format!("scripted failure on call {}", call)));
        }
        let results = self
            .results
            .iter()
            .filter(|d| d.score() >= threshold)
            .cloned()
            .collect();
        Ok(Detections::new(results, 1))
    }

    fn reset(&mut self) {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn boxed(label: &str, left: f32, top: f32, right: f32, bottom: f32, score: f32) -> Detection {
    Detection::new(BBox::new(left, top, right, bottom), label, score)
}

/// In-memory camera.
pub struct MemorySource {
    frames: VecDeque<CameraFrame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = CameraFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<CameraFrame>, CameraError> {
        Ok(self.frames.pop_front())
    }
}
