/// Camera input
///
/// - FrameSource:          anything that yields `CameraFrame`s in order
/// - ImageSequenceSource:  replays a directory of still images as a camera
/// - CameraFeed:           thread pumping a source into the pipeline
/// - CameraFacing:         front/back selection and its capture rotation
pub mod feed;
pub mod sequence;

pub use feed::CameraFeed;
pub use sequence::ImageSequenceSource;

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::CameraFrame;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera access denied for {path}")]
    PermissionDenied { path: PathBuf },
    #[error("failed to open camera {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no frames available from {0}")]
    Empty(PathBuf),
    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl CameraError {
    /// Map an io error, keeping permission failures distinguishable.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            CameraError::PermissionDenied { path }
        } else {
            CameraError::Open { path, source }
        }
    }
}

/// Camera capability. `Ok(None)` means the stream has ended.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<CameraFrame>, CameraError>;

    fn name(&self) -> String {
        "camera".to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub fn toggle(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }

    /// Rotation applied to the screenshot so it comes out upright.
    pub fn capture_rotation(self) -> f32 {
        match self {
            CameraFacing::Back => 90.0,
            CameraFacing::Front => -90.0,
        }
    }
}

impl std::str::FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "back" | "rear" => Ok(CameraFacing::Back),
            "front" => Ok(CameraFacing::Front),
            other => Err(format!("unknown camera facing '{}'", other)),
        }
    }
}
