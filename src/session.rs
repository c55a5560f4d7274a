//! Detection session
//!
//! Wires camera → analysis pipeline → overlay, with threshold control,
//! front/back toggle and screenshot capture. Built explicitly with
//! `Session::start` and torn down with `shutdown` (or on drop).

use std::path::PathBuf;
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;

use crate::capture::{CaptureStore, JpegDirectoryStore, PersistenceError};
use crate::controls::{self, Overlay, ThresholdController};
use crate::detection::{Detection, DetectorFactory, DetectorOptions};
use crate::input::{CameraError, CameraFacing, CameraFeed, FrameSource};
use crate::pipeline::{DetectorListener, FrameAnalysisPipeline, PipelineError, StatsSnapshot};
use crate::renderer::ResultRenderer;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera permission denied ({0}); grant access and try again")]
    PermissionDenied(String),
    #[error("camera initialization failed: {0}")]
    CameraInit(#[source] CameraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<CameraError> for SessionError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::PermissionDenied { path } => {
                SessionError::PermissionDenied(path.display().to_string())
            }
            other => SessionError::CameraInit(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("nothing to capture yet: no frame has been analysed")]
    NothingToCapture,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

// ========== Overlay ==========

/// Presentation-side view of the latest results.
#[derive(Clone, Debug, Default)]
pub struct OverlayState {
    results: Vec<Detection>,
    items_text: String,
    image_width: u32,
    image_height: u32,
    inference_ms: u64,
    last_error: Option<String>,
    result_events: u64,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[Detection] {
        &self.results
    }

    /// "Items Detected: N" for the last delivered result set.
    pub fn items_text(&self) -> &str {
        &self.items_text
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    pub fn inference_ms(&self) -> u64 {
        self.inference_ms
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Result sets received so far.
    pub fn result_events(&self) -> u64 {
        self.result_events
    }

    /// Factor mapping image coordinates onto a `view_width` x `view_height`
    /// view filled edge to edge.
    pub fn scale_factor(&self, view_width: u32, view_height: u32) -> f32 {
        if self.image_width == 0 || self.image_height == 0 {
            return 1.0;
        }
        let sx = view_width as f32 / self.image_width as f32;
        let sy = view_height as f32 / self.image_height as f32;
        sx.max(sy)
    }
}

impl DetectorListener for OverlayState {
    fn on_results(
        &mut self,
        results: &[Detection],
        inference_ms: u64,
        image_height: u32,
        image_width: u32,
    ) {
        self.results = results.to_vec();
        self.items_text = format!("Items Detected: {}", results.len());
        self.image_width = image_width;
        self.image_height = image_height;
        self.inference_ms = inference_ms;
        self.result_events += 1;
    }

    fn on_error(&mut self, message: &str) {
        log::warn!("⚠️ {}", message);
        self.last_error = Some(message.to_string());
    }
}

impl Overlay for OverlayState {
    fn clear(&mut self) {
        self.results.clear();
    }
}

// ========== Session ==========

/// Opens the camera for a facing. Called at start and on every toggle.
pub trait CameraOpener: Send {
    fn open(&mut self, facing: CameraFacing) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl<F> CameraOpener for F
where
    F: FnMut(CameraFacing) -> Result<Box<dyn FrameSource>, CameraError> + Send,
{
    fn open(&mut self, facing: CameraFacing) -> Result<Box<dyn FrameSource>, CameraError> {
        self(facing)
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub facing: CameraFacing,
    /// Threshold slider level, 0..=8
    pub level: i32,
    /// Camera pacing; None feeds frames as fast as the source produces them.
    pub frame_interval: Option<Duration>,
    pub detector: DetectorOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Back,
            level: controls::DEFAULT_LEVEL,
            frame_interval: None,
            detector: DetectorOptions::default(),
        }
    }
}

pub struct Session {
    opener: Box<dyn CameraOpener>,
    feed: Option<CameraFeed>,
    pipeline: FrameAnalysisPipeline,
    threshold: ThresholdController,
    overlay: OverlayState,
    facing: CameraFacing,
    frame_interval: Option<Duration>,
    renderer: ResultRenderer,
    store: Box<dyn CaptureStore>,
}

impl Session {
    /// Open the camera, start the analysis worker and begin feeding frames.
    pub fn start<O, F>(mut opener: O, factory: F, config: SessionConfig) -> Result<Self, SessionError>
    where
        O: CameraOpener + 'static,
        F: DetectorFactory + 'static,
    {
        let source = opener.open(config.facing)?;

        let level = config.level.clamp(0, controls::MAX_LEVEL);
        let options = config.detector.with_threshold(controls::threshold_of(level));
        let pipeline = FrameAnalysisPipeline::spawn(factory, options)?;
        let threshold = ThresholdController::with_level(pipeline.control(), level);
        let feed = CameraFeed::start(
            source,
            config.facing,
            pipeline.submitter(),
            config.frame_interval,
        )?;

        log::info!(
            "✅ session started ({:?} camera, threshold {:.2})",
            config.facing,
            threshold.threshold()
        );
        Ok(Self {
            opener: Box::new(opener),
            feed: Some(feed),
            pipeline,
            threshold,
            overlay: OverlayState::new(),
            facing: config.facing,
            frame_interval: config.frame_interval,
            renderer: ResultRenderer::new(),
            store: Box::new(JpegDirectoryStore::default()),
        })
    }

    pub fn with_store(mut self, store: impl CaptureStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_renderer(mut self, renderer: ResultRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayState {
        &mut self.overlay
    }

    pub fn pipeline(&self) -> &FrameAnalysisPipeline {
        &self.pipeline
    }

    /// Deliver pending results/errors to the overlay.
    pub fn pump(&mut self) -> usize {
        self.pipeline.dispatch(&mut self.overlay)
    }

    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        self.pipeline.dispatch_timeout(&mut self.overlay, timeout)
    }

    pub fn threshold_level(&self) -> i32 {
        self.threshold.level()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.threshold()
    }

    /// Slider released at `step`: clear the overlay and rebuild the detector
    /// on the next frame.
    pub fn set_threshold_level(&mut self, step: i32) -> Result<f32, SessionError> {
        let threshold = self.threshold.set_level(step, &mut self.overlay)?;
        log::info!(
            "🎛️ threshold {} ({:.2})",
            controls::percent_label(self.threshold.level()),
            threshold
        );
        Ok(threshold)
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Switch between front and back camera. The old feed is stopped before
    /// the new camera opens.
    pub fn toggle_camera(&mut self) -> Result<CameraFacing, SessionError> {
        let next = self.facing.toggle();
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
        let source = self.opener.open(next)?;
        self.feed = Some(CameraFeed::start(
            source,
            next,
            self.pipeline.submitter(),
            self.frame_interval,
        )?);
        self.facing = next;
        log::info!("🔄 switched to {:?} camera", next);
        Ok(next)
    }

    pub fn camera_active(&self) -> bool {
        self.feed.as_ref().map(|f| f.is_active()).unwrap_or(false)
    }

    /// Block until the camera source runs dry. Returns frames fed.
    pub fn wait_for_camera(&mut self) -> u64 {
        self.feed.as_mut().map(|f| f.wait()).unwrap_or(0)
    }

    /// Composite the last analysed frame with its results, upright for the
    /// camera that took it.
    pub fn render_capture(&self) -> Result<RgbaImage, CaptureError> {
        let snapshot = self
            .pipeline
            .latest_snapshot()
            .ok_or(CaptureError::NothingToCapture)?;
        Ok(self.renderer.render(
            &snapshot.frame,
            &snapshot.results,
            snapshot.facing.capture_rotation(),
        ))
    }

    pub fn capture(&self) -> Result<PathBuf, CaptureError> {
        self.capture_with(self.store.as_ref())
    }

    pub fn capture_with(&self, store: &dyn CaptureStore) -> Result<PathBuf, CaptureError> {
        let image = self.render_capture()?;
        Ok(store.save(&image)?)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline.stats()
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Stop the camera, then the worker. Pending events stay readable via
    /// `pump`.
    pub fn shutdown(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
        self.pipeline.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn det(label: &str) -> Detection {
        Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), label, 0.9)
    }

    #[test]
    fn overlay_tracks_latest_results() {
        let mut overlay = OverlayState::new();
        overlay.on_results(&[det("cup"), det("dog")], 12, 480, 640);
        assert_eq!(overlay.results().len(), 2);
        assert_eq!(overlay.items_text(), "Items Detected: 2");
        assert_eq!(overlay.image_size(), (640, 480));
        assert_eq!(overlay.inference_ms(), 12);

        overlay.on_results(&[], 5, 480, 640);
        assert!(overlay.results().is_empty());
        assert_eq!(overlay.items_text(), "Items Detected: 0");
        assert_eq!(overlay.result_events(), 2);
    }

    #[test]
    fn clear_blanks_boxes_only() {
        let mut overlay = OverlayState::new();
        overlay.on_results(&[det("cup")], 3, 10, 10);
        overlay.clear();
        assert!(overlay.results().is_empty());
        assert_eq!(overlay.items_text(), "Items Detected: 1");
    }

    #[test]
    fn errors_are_kept_until_taken() {
        let mut overlay = OverlayState::new();
        overlay.on_error("boom");
        assert_eq!(overlay.last_error(), Some("boom"));
        assert_eq!(overlay.take_error().as_deref(), Some("boom"));
        assert!(overlay.last_error().is_none());
    }

    #[test]
    fn scale_factor_fills_view() {
        let mut overlay = OverlayState::new();
        assert_eq!(overlay.scale_factor(100, 100), 1.0);
        overlay.on_results(&[], 0, 200, 100);
        assert_eq!(overlay.scale_factor(300, 300), 3.0);
    }

    #[test]
    fn permission_denied_maps_to_its_own_variant() {
        let e: SessionError = CameraError::PermissionDenied {
            path: "/dev/video0".into(),
        }
        .into();
        assert!(matches!(e, SessionError::PermissionDenied(_)));
        let e: SessionError = CameraError::Empty("frames".into()).into();
        assert!(matches!(e, SessionError::CameraInit(_)));
    }
}
