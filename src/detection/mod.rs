pub mod replay;
pub mod select;
pub mod traits;
pub mod types;

pub use replay::{ReplayDetector, ReplayScript};
pub use select::{largest_face, select_best_face, DEFAULT_CONFIDENCE_THRESHOLD};
pub use traits::{DetectionInput, FaceDetector};
pub use types::{DetectionResult, FaceLandmarks, FaceObservation};
