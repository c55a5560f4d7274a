/// objcam
///
/// Replays a directory of frames as a camera through the detection pipeline.
///
/// Threads:
/// 1. camera-feed:     reads frames, latest-only hand-off to the worker
/// 2. frame-analysis:  copy + detect, one inference at a time
/// 3. main:            overlay updates, logging, screenshots
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use objcam_rs::capture::{default_capture_dir, JpegDirectoryStore};
use objcam_rs::controls::percent_label;
use objcam_rs::input::{CameraError, CameraFacing, FrameSource, ImageSequenceSource};
use objcam_rs::{AppConfig, Args, CaptureError, Session};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config);
    args.apply(&mut config);

    log::info!("🚀 objcam starting");
    log::info!("📦 model: {}", args.model.display());
    log::info!("📷 frames: {}", args.frames.display());
    log::info!(
        "🎛️ threshold level {} ({})",
        config.level,
        percent_label(config.level)
    );

    let factory = detector_factory(&args)?;

    let frames_dir = args.frames.clone();
    let rotation = config.sensor_rotation;
    let looping = args.looping;
    let opener = move |facing: CameraFacing| -> Result<Box<dyn FrameSource>, CameraError> {
        log::info!("opening {:?} camera", facing);
        let source = ImageSequenceSource::open(&frames_dir, rotation)?.looping(looping);
        Ok(Box::new(source))
    };

    let store = JpegDirectoryStore::new(
        config
            .capture_dir
            .clone()
            .unwrap_or_else(default_capture_dir),
    );
    let mut session = Session::start(opener, factory, config.session_config())
        .context("failed to start session")?
        .with_store(store);

    let mut last_reported = 0;
    loop {
        let camera_done = !session.camera_active();
        session.pump_timeout(Duration::from_millis(100));
        handle_events(&mut session, &mut last_reported, config.capture_every);

        if !session.is_running() {
            log::error!("❌ analysis stopped");
            break;
        }
        // feed ended before this round and the worker has caught up
        if camera_done && session.stats().pending() == 0 {
            session.pump();
            handle_events(&mut session, &mut last_reported, config.capture_every);
            break;
        }
    }

    save_capture(&session);
    let stats = session.stats();
    session.shutdown();
    log::info!(
        "📊 submitted {} | dropped {} | analysed {} | failed {} | detector builds {}",
        stats.submitted,
        stats.dropped,
        stats.analyzed,
        stats.failed,
        stats.detector_builds
    );
    Ok(())
}

fn handle_events(session: &mut Session, last_reported: &mut u64, capture_every: u64) {
    let events = session.overlay().result_events();
    if events != *last_reported {
        *last_reported = events;
        report(session);
        if capture_every > 0 && events % capture_every == 0 {
            save_capture(session);
        }
    }
    if let Some(e) = session.overlay_mut().take_error() {
        log::warn!("⚠️ detector: {}", e);
    }
}

fn report(session: &Session) {
    let overlay = session.overlay();
    let labels: Vec<String> = overlay.results().iter().map(|d| d.display_text()).collect();
    log::info!(
        "{} | {}ms | {}",
        overlay.items_text(),
        overlay.inference_ms(),
        labels.join(", ")
    );
}

fn save_capture(session: &Session) {
    match session.capture() {
        Ok(path) => log::info!("📸 screenshot: {}", path.display()),
        Err(CaptureError::NothingToCapture) => log::warn!("⚠️ no analysed frame to capture"),
        Err(e) => log::error!("❌ {}", e),
    }
}

#[cfg(feature = "onnx")]
fn detector_factory(args: &Args) -> Result<impl objcam_rs::DetectorFactory + 'static> {
    use objcam_rs::detection::{load_labels, OnnxDetector, YoloDecoder};
    use objcam_rs::{Detector, DetectorError, DetectorOptions};

    let labels = match &args.labels {
        Some(path) => Some(
            load_labels(path).with_context(|| format!("failed to read labels {}", path.display()))?,
        ),
        None => None,
    };
    let model = args.model.clone();
    Ok(move |options: &DetectorOptions| -> Result<Box<dyn Detector>, DetectorError> {
        let decoder = match &labels {
            Some(labels) => YoloDecoder::new(labels.clone(), 0.45, options.max_results),
            None => YoloDecoder::coco(options.max_results),
        };
        Ok(Box::new(OnnxDetector::new(&model, decoder, options)?))
    })
}

#[cfg(not(feature = "onnx"))]
type NoBackend = fn(
    &objcam_rs::DetectorOptions,
) -> Result<Box<dyn objcam_rs::Detector>, objcam_rs::DetectorError>;

#[cfg(not(feature = "onnx"))]
fn detector_factory(_args: &Args) -> Result<NoBackend> {
    anyhow::bail!("objcam was built without a detector backend; rebuild with `--features onnx`")
}
