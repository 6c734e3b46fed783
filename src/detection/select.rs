use crate::detection::types::FaceObservation;

/// Confidence below which a live-frame face is treated as absent.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.45;

/// Largest-area face, regardless of confidence.
pub fn largest_face(observations: &[FaceObservation]) -> Option<&FaceObservation> {
    observations.iter().max_by(|a, b| {
        a.bounding_box
            .area()
            .partial_cmp(&b.bounding_box.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Pick the largest face, then reject it if its confidence is under
/// `threshold`. A smaller confident face does not replace a rejected larger one.
pub fn select_best_face(observations: &[FaceObservation], threshold: f32) -> Option<&FaceObservation> {
    largest_face(observations).filter(|face| face.confidence >= threshold)
}
