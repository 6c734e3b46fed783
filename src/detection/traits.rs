use image::RgbaImage;

use crate::compositor::orientation::FrameOrientation;
use crate::detection::types::FaceObservation;
use crate::errors::FaceSwapResult;

/// What a detector is asked to look at.
pub struct DetectionInput<'a> {
    /// Pixels in the buffer's native orientation.
    pub image: &'a RgbaImage,
    /// How the buffer must be oriented for display. Observations are
    /// normalized against the oriented image.
    pub orientation: FrameOrientation,
    /// Index of the frame within its capture source, when there is one.
    pub frame_index: Option<u64>,
}

/// Pluggable face and landmark detection backend.
///
/// Implementations return every face they find; selection and confidence
/// gating happen in [`crate::detection::select_best_face`].
pub trait FaceDetector: Send + Sync {
    fn detect(&self, input: &DetectionInput<'_>) -> FaceSwapResult<Vec<FaceObservation>>;
}
