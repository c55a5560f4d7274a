//! Command-line arguments and the JSON settings file.
//!
//! Settings live in `objcam.json` next to the working directory by default;
//! flags given on the command line override what the file says.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::controls;
use crate::detection::DetectorOptions;
use crate::input::CameraFacing;
use crate::session::SessionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "objcam.json";

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "objcam - object detection overlay on a frame stream", long_about = None)]
pub struct Args {
    /// Directory of frames to replay as the camera
    #[arg(short, long)]
    pub frames: PathBuf,

    /// ONNX model path
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// Labels file, one class name per line (COCO-80 if omitted)
    #[arg(long)]
    pub labels: Option<PathBuf>,

    /// Settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Threshold slider level 0..=8 (threshold = level / 10)
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(0..=8))]
    pub level: Option<i32>,

    /// Camera facing: back or front
    #[arg(long)]
    pub facing: Option<CameraFacing>,

    /// Sensor rotation carried by every frame, in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub rotation: Option<i32>,

    /// Screenshot directory (Pictures folder if omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Take a screenshot every N result sets (0 = only at the end)
    #[arg(long)]
    pub capture_every: Option<u64>,

    /// Camera frame rate
    #[arg(long)]
    pub fps: Option<f32>,

    /// Replay the frames directory forever
    #[arg(long = "loop", default_value_t = false)]
    pub looping: bool,
}

impl Args {
    /// Overlay command-line flags onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
        if let Some(facing) = self.facing {
            config.facing = facing;
        }
        if let Some(rotation) = self.rotation {
            config.sensor_rotation = rotation;
        }
        if let Some(out) = &self.out {
            config.capture_dir = Some(out.clone());
        }
        if let Some(every) = self.capture_every {
            config.capture_every = every;
        }
        if let Some(fps) = self.fps {
            config.fps = Some(fps);
        }
    }
}

/// Persistent settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub level: i32,
    pub facing: CameraFacing,
    pub sensor_rotation: i32,
    pub max_results: usize,
    pub num_threads: usize,
    pub capture_dir: Option<PathBuf>,
    pub capture_every: u64,
    pub fps: Option<f32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let detector = DetectorOptions::default();
        Self {
            level: controls::DEFAULT_LEVEL,
            facing: CameraFacing::Back,
            sensor_rotation: 0,
            max_results: detector.max_results,
            num_threads: detector.num_threads,
            capture_dir: None,
            capture_every: 0,
            fps: Some(30.0),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file is created with defaults; a file
    /// that fails to parse is left alone and defaults are used.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    log::info!("✅ settings loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️ {} is not valid settings JSON ({}), using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 {} not found, writing defaults", path.display());
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::warn!("⚠️ {:#}", e);
                }
                config
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("💾 settings saved to {}", path.display());
        Ok(())
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            facing: self.facing,
            level: self.level.clamp(0, controls::MAX_LEVEL),
            frame_interval: self.frame_interval(),
            detector: DetectorOptions {
                threshold: controls::threshold_of(self.level),
                max_results: self.max_results.max(1),
                num_threads: self.num_threads.max(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_command_line() {
        let args = Args::try_parse_from(["objcam", "--frames", "clips"]).unwrap();
        assert_eq!(args.frames, PathBuf::from("clips"));
        assert_eq!(args.model, PathBuf::from("models/yolov8n.onnx"));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(args.level.is_none());
        assert!(!args.looping);
    }

    #[test]
    fn parses_full_command_line() {
        let args = Args::try_parse_from([
            "objcam", "-f", "clips", "-l", "3", "--facing", "front", "--rotation", "-90",
            "--capture-every", "10", "--fps", "5", "--loop",
        ])
        .unwrap();
        assert_eq!(args.level, Some(3));
        assert_eq!(args.facing, Some(CameraFacing::Front));
        assert_eq!(args.rotation, Some(-90));
        assert_eq!(args.capture_every, Some(10));
        assert!(args.looping);
    }

    #[test]
    fn rejects_out_of_range_level() {
        assert!(Args::try_parse_from(["objcam", "-f", "x", "-l", "9"]).is_err());
    }

    #[test]
    fn flags_override_file_settings() {
        let args = Args::try_parse_from(["objcam", "-f", "x", "-l", "2", "-o", "shots"]).unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.level, 2);
        assert_eq!(config.capture_dir, Some(PathBuf::from("shots")));
        assert_eq!(config.facing, CameraFacing::Back);
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objcam.json");
        let config = AppConfig::load(&path);
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objcam.json");
        let config = AppConfig {
            level: 7,
            facing: CameraFacing::Front,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path), config);
    }

    #[test]
    fn partial_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objcam.json");
        std::fs::write(&path, r#"{ "level": 1 }"#).unwrap();
        let config = AppConfig::load(&path);
        assert_eq!(config.level, 1);
        assert_eq!(config.max_results, 3);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn session_config_uses_level_threshold() {
        let config = AppConfig {
            level: 2,
            fps: None,
            ..AppConfig::default()
        };
        let session = config.session_config();
        assert!((session.detector.threshold - 0.2).abs() < 1e-6);
        assert!(session.frame_interval.is_none());
    }
}
