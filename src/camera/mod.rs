pub mod directory;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use directory::DirectorySource;
pub use traits::{CaptureSource, FrameSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn from_front(is_front: bool) -> Self {
        if is_front {
            CameraFacing::Front
        } else {
            CameraFacing::Back
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, CameraFacing::Front)
    }

    pub fn toggled(&self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}
