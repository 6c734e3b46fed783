use serde::{Deserialize, Serialize};

use crate::geometry::{BufferDimensions, NormalizedRect, Point};

/// Landmark regions of one face, each a list of normalized points in the
/// detector's (bottom-left origin) image space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    #[serde(default)]
    pub left_eye: Vec<Point>,
    #[serde(default)]
    pub right_eye: Vec<Point>,
    #[serde(default)]
    pub nose: Vec<Point>,
    #[serde(default)]
    pub outer_lips: Vec<Point>,
}

impl FaceLandmarks {
    /// Centroid of each non-empty region, in the order left eye, right eye,
    /// nose, outer lips.
    pub fn centroids(&self) -> Vec<Point> {
        [&self.left_eye, &self.right_eye, &self.nose, &self.outer_lips]
            .into_iter()
            .filter_map(|region| centroid(region))
            .collect()
    }
}

fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// A single face as reported by a detector, before selection and gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bounding_box: NormalizedRect,
    pub confidence: f32,
    /// Radians. Detectors that do not estimate roll leave this empty.
    #[serde(default)]
    pub roll: Option<f64>,
    #[serde(default)]
    pub landmarks: Option<FaceLandmarks>,
}

/// The face chosen for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub bounding_box: NormalizedRect,
    pub confidence: f32,
    pub roll: f64,
    /// Effective (display-oriented) buffer size the box is normalized against.
    pub buffer: BufferDimensions,
    pub landmark_points: Vec<Point>,
}

impl DetectionResult {
    pub fn from_observation(obs: &FaceObservation, buffer: BufferDimensions) -> Self {
        Self {
            bounding_box: obs.bounding_box,
            confidence: obs.confidence,
            roll: obs.roll.unwrap_or(0.0),
            buffer,
            landmark_points: obs
                .landmarks
                .as_ref()
                .map(FaceLandmarks::centroids)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroids_skip_missing_regions_and_keep_order() {
        let lm = FaceLandmarks {
            left_eye: vec![Point::new(0.3, 0.6), Point::new(0.4, 0.6)],
            right_eye: vec![],
            nose: vec![Point::new(0.5, 0.5)],
            outer_lips: vec![Point::new(0.4, 0.3), Point::new(0.6, 0.3), Point::new(0.5, 0.36)],
        };
        let c = lm.centroids();
        assert_eq!(c.len(), 3);
        assert!((c[0].x - 0.35).abs() < 1e-12);
        assert_eq!(c[1], Point::new(0.5, 0.5));
        assert!((c[2].y - 0.32).abs() < 1e-12);
    }

    #[test]
    fn missing_roll_defaults_to_zero() {
        let obs = FaceObservation {
            bounding_box: NormalizedRect::new(0.1, 0.1, 0.2, 0.2),
            confidence: 0.9,
            roll: None,
            landmarks: None,
        };
        let r = DetectionResult::from_observation(&obs, BufferDimensions::new(1080, 1920));
        assert_eq!(r.roll, 0.0);
        assert!(r.landmark_points.is_empty());
        assert_eq!(r.buffer.width, 1080);
    }

    #[test]
    fn observation_parses_with_optional_fields_absent() {
        let obs: FaceObservation = serde_json::from_str(
            r#"{"bounding_box":{"x":0.1,"y":0.2,"width":0.3,"height":0.4},"confidence":0.8}"#,
        )
        .unwrap();
        assert!(obs.roll.is_none());
        assert!(obs.landmarks.is_none());
    }
}
