//! Camera feed thread: pulls frames from a `FrameSource` and hands them to the
//! pipeline. Runs until the source ends, fails, or `stop` is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{CameraFacing, FrameSource};
use crate::pipeline::{FrameSubmitter, PipelineError};

pub struct CameraFeed {
    stop: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl CameraFeed {
    /// Start feeding. Frames are tagged with `facing`; `interval` paces the
    /// source (None = as fast as it produces frames).
    pub fn start(
        mut source: Box<dyn FrameSource>,
        facing: CameraFacing,
        submitter: FrameSubmitter,
        interval: Option<Duration>,
    ) -> Result<Self, PipelineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(true));

        let stop_flag = Arc::clone(&stop);
        let active_flag = Arc::clone(&active);
        let handle = std::thread::Builder::new()
            .name("camera-feed".into())
            .spawn(move || {
                let name = source.name();
                log::info!("🎥 camera feed started: {}", name);
                let mut fed = 0u64;

                while !stop_flag.load(Ordering::Acquire) {
                    let started = Instant::now();
                    match source.next_frame() {
                        Ok(Some(frame)) => {
                            if let Err(e) = submitter.submit(frame.with_facing(facing)) {
                                log::warn!("⚠️ camera feed stopping: {}", e);
                                break;
                            }
                            fed += 1;
                        }
                        Ok(None) => {
                            log::info!("camera stream ended after {} frames", fed);
                            break;
                        }
                        Err(e) => {
                            log::error!("❌ camera error: {}", e);
                            break;
                        }
                    }
                    if let Some(interval) = interval {
                        if let Some(rest) = interval.checked_sub(started.elapsed()) {
                            std::thread::sleep(rest);
                        }
                    }
                }

                active_flag.store(false, Ordering::Release);
                fed
            })
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            stop,
            active,
            handle: Some(handle),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Block until the source runs dry. Returns the number of frames fed.
    pub fn wait(&mut self) -> u64 {
        self.handle
            .take()
            .map(|h| h.join().unwrap_or_else(|_| {
                log::error!("❌ camera feed panicked");
                0
            }))
            .unwrap_or(0)
    }

    pub fn stop(&mut self) -> u64 {
        self.stop.store(true, Ordering::Release);
        self.wait()
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
