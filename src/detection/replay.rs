/// Detector that replays recorded observations instead of running a model.
///
/// Script format (JSON):
///
/// ```json
/// {
///   "all_frames": [ { "bounding_box": {...}, "confidence": 0.9 } ],
///   "frames": { "12": [ ... ], "13": [] }
/// }
/// ```
///
/// `frames` entries win over `all_frames` for their index; inputs without a
/// frame index (still images) get `all_frames`.
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::traits::{DetectionInput, FaceDetector};
use crate::detection::types::FaceObservation;
use crate::errors::FaceSwapResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub all_frames: Vec<FaceObservation>,
    #[serde(default)]
    pub frames: HashMap<u64, Vec<FaceObservation>>,
}

pub struct ReplayDetector {
    script: ReplayScript,
}

impl ReplayDetector {
    pub fn new(script: ReplayScript) -> Self {
        Self { script }
    }

    /// Same observations for every input.
    pub fn constant(observations: Vec<FaceObservation>) -> Self {
        Self::new(ReplayScript {
            all_frames: observations,
            frames: HashMap::new(),
        })
    }

    pub fn from_json(text: &str) -> FaceSwapResult<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn load(path: &Path) -> FaceSwapResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let detector = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            keyed_frames = detector.script.frames.len(),
            "replay detections loaded"
        );
        Ok(detector)
    }
}

impl FaceDetector for ReplayDetector {
    fn detect(&self, input: &DetectionInput<'_>) -> FaceSwapResult<Vec<FaceObservation>> {
        let observations = input
            .frame_index
            .and_then(|idx| self.script.frames.get(&idx))
            .unwrap_or(&self.script.all_frames);
        Ok(observations.clone())
    }
}
