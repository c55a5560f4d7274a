/// Frame analysis pipeline
///
/// Two execution contexts, connected by crossbeam channels:
/// - worker:       frame copy + detection, one inference in flight (own thread)
/// - presentation: receives ordered results/errors via `dispatch` (caller's thread)
///
/// Camera frames enter through a one-slot latest-only mailbox: a frame that
/// is still pending when a newer one arrives is evicted and released.
pub mod frame;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::detection::{Detection, DetectorFactory, DetectorOptions, InferredFrame};
pub use frame::{CameraFrame, CaptureSnapshot, FrameBuffer, SnapshotCell};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn analysis worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("analysis pipeline stopped")]
    Stopped,
    #[error("frame size changed from {expected:?} to {actual:?}; frame buffer is fixed per session")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("frame holds {actual} bytes, expected {expected}")]
    ShortFrame { expected: usize, actual: usize },
}

// ========== Messages ==========

/// Worker → presentation
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Results(InferredFrame),
    Error(String),
}

/// Presentation → worker
#[derive(Clone, Debug)]
pub(crate) enum Control {
    /// Discard the detector; rebuild lazily with this threshold.
    SetThreshold(f32),
    Shutdown,
}

/// Receives pipeline output on the presentation thread.
pub trait DetectorListener {
    fn on_results(
        &mut self,
        results: &[Detection],
        inference_ms: u64,
        image_height: u32,
        image_width: u32,
    );

    fn on_error(&mut self, message: &str);
}

// ========== Statistics ==========

#[derive(Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    analyzed: AtomicU64,
    failed: AtomicU64,
    detector_builds: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// frames handed to `submit`
    pub submitted: u64,
    /// frames released without analysis (evicted by a newer one)
    pub dropped: u64,
    pub analyzed: u64,
    pub failed: u64,
    pub detector_builds: u64,
}

impl StatsSnapshot {
    /// Frames submitted but not yet analysed, failed or dropped.
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.dropped + self.analyzed + self.failed)
    }
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            analyzed: self.analyzed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            detector_builds: self.detector_builds.load(Ordering::Acquire),
        }
    }
}

// ========== Submission ==========

/// Camera-side handle. Cheap to clone; meant for a single camera context.
#[derive(Clone)]
pub struct FrameSubmitter {
    slot: Sender<CameraFrame>,
    evict: Receiver<CameraFrame>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl FrameSubmitter {
    /// Hand a frame to the worker. Never blocks; a pending older frame is
    /// released in favour of this one.
    pub fn submit(&self, frame: CameraFrame) -> Result<(), PipelineError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(PipelineError::Stopped);
        }
        let frame = match self.slot.try_send(frame) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(TrySendError::Full(frame)) => frame,
            Err(TrySendError::Disconnected(_)) => return Err(PipelineError::Stopped),
        };

        if let Ok(stale) = self.evict.try_recv() {
            drop(stale);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
        match self.slot.try_send(frame) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                // another submitter won the slot
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::Stopped),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

// ========== Pipeline ==========

pub struct FrameAnalysisPipeline {
    submitter: FrameSubmitter,
    control: Sender<Control>,
    events: Receiver<PipelineEvent>,
    snapshots: SnapshotCell,
    stats: Arc<PipelineStats>,
    worker: Option<JoinHandle<()>>,
}

impl FrameAnalysisPipeline {
    /// Start the analysis worker. The detector is built lazily on the worker
    /// thread when the first frame arrives.
    pub fn spawn<F>(factory: F, options: DetectorOptions) -> Result<Self, PipelineError>
    where
        F: DetectorFactory + 'static,
    {
        let (slot_tx, slot_rx) = crossbeam_channel::bounded::<CameraFrame>(1);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(PipelineStats::default());
        let snapshots = SnapshotCell::default();

        let worker = worker::Worker::new(
            Box::new(factory),
            options,
            snapshots.clone(),
            event_tx,
            Arc::clone(&stats),
            Arc::clone(&running),
        );
        let frames = slot_rx.clone();
        let handle = std::thread::Builder::new()
            .name("frame-analysis".into())
            .spawn(move || worker.run(frames, control_rx))
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            submitter: FrameSubmitter {
                slot: slot_tx,
                evict: slot_rx,
                running,
                stats: Arc::clone(&stats),
            },
            control: control_tx,
            events: event_rx,
            snapshots,
            stats,
            worker: Some(handle),
        })
    }

    pub fn submit(&self, frame: CameraFrame) -> Result<(), PipelineError> {
        self.submitter.submit(frame)
    }

    pub fn submitter(&self) -> FrameSubmitter {
        self.submitter.clone()
    }

    pub fn control(&self) -> ControlHandle {
        ControlHandle {
            tx: self.control.clone(),
        }
    }

    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Deliver every pending event to `listener` on the calling thread.
    pub fn dispatch<L: DetectorListener + ?Sized>(&self, listener: &mut L) -> usize {
        let mut delivered = 0;
        for event in self.events.try_iter() {
            deliver(listener, event);
            delivered += 1;
        }
        delivered
    }

    /// Like `dispatch`, but waits up to `timeout` for the first event.
    pub fn dispatch_timeout<L: DetectorListener + ?Sized>(
        &self,
        listener: &mut L,
        timeout: Duration,
    ) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                deliver(listener, event);
                1 + self.dispatch(listener)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn latest_snapshot(&self) -> Option<Arc<CaptureSnapshot>> {
        self.snapshots.latest()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.submitter.is_running()
    }

    /// Stop the worker and release the detector. The in-flight inference, if
    /// any, runs to completion first.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if handle.join().is_err() {
            log::error!("❌ analysis worker panicked");
        }
        self.submitter.running.store(false, Ordering::Release);
    }
}

impl Drop for FrameAnalysisPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver<L: DetectorListener + ?Sized>(listener: &mut L, event: PipelineEvent) {
    match event {
        PipelineEvent::Results(frame) => listener.on_results(
            &frame.results,
            frame.inference_ms,
            frame.image_height,
            frame.image_width,
        ),
        PipelineEvent::Error(message) => listener.on_error(&message),
    }
}

/// Presentation-side handle for reconfiguring the worker.
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Control>,
}

impl ControlHandle {
    /// Mark the detector stale; the next frame rebuilds it with `threshold`.
    pub fn set_threshold(&self, threshold: f32) -> Result<(), PipelineError> {
        self.tx
            .send(Control::SetThreshold(threshold))
            .map_err(|_| PipelineError::Stopped)
    }
}
