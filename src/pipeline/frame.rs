use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::camera::CameraFacing;
use crate::compositor::FrameOrientation;
use crate::detection::DetectionResult;
use crate::errors::FaceSwapResult;
use crate::geometry::{map_point_to_screen, map_rect_to_screen, BufferDimensions, Point, Rect, Size};

/// One camera frame in the sensor's native orientation.
#[derive(Clone)]
pub struct Frame {
    pub index: u64,
    pub pixels: Arc<RgbaImage>,
    pub facing: CameraFacing,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(index: u64, pixels: Arc<RgbaImage>, facing: CameraFacing) -> Self {
        Self {
            index,
            pixels,
            facing,
            timestamp: Utc::now(),
        }
    }

    pub fn native_dimensions(&self) -> BufferDimensions {
        let (w, h) = self.pixels.dimensions();
        BufferDimensions::new(w, h)
    }

    pub fn orientation(&self) -> FrameOrientation {
        FrameOrientation::for_camera(self.facing.is_front())
    }

    pub fn effective_dimensions(&self) -> BufferDimensions {
        self.orientation().effective_dimensions(self.native_dimensions())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("dimensions", &self.pixels.dimensions())
            .field("facing", &self.facing)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Screen-space face for the preview overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceOverlayState {
    pub face_rect: Rect,
    pub roll: f64,
    /// Landmark centroids on screen, for the debug overlay.
    pub landmarks: Vec<Point>,
    pub confidence: f32,
}

impl FaceOverlayState {
    /// `None` when the face cannot be placed in this viewport.
    pub fn from_detection(detection: &DetectionResult, viewport: Size) -> Option<Self> {
        let face_rect = map_rect_to_screen(&detection.bounding_box, detection.buffer, viewport);
        if face_rect.is_empty() {
            return None;
        }
        Some(Self {
            face_rect,
            roll: detection.roll,
            landmarks: detection
                .landmark_points
                .iter()
                .map(|p| map_point_to_screen(*p, detection.buffer, viewport))
                .collect(),
            confidence: detection.confidence,
        })
    }
}

/// Result of one processed frame, handed to the render side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameUpdate {
    /// Monotonic per pipeline, starting at 1. 0 means "nothing processed yet".
    pub sequence: u64,
    pub frame_index: u64,
    /// Effective (display-oriented) buffer size of the frame.
    pub buffer: BufferDimensions,
    /// Viewport the face rect was mapped into.
    pub viewport: Size,
    pub face: Option<FaceOverlayState>,
}

/// A composed capture, ready for save/share.
#[derive(Clone)]
pub struct CapturedImage {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub image: RgbaImage,
}

impl CapturedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            image,
        }
    }

    /// Write as PNG into `dir`, named by capture time and id.
    pub fn save_png(&self, dir: &Path) -> FaceSwapResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let name = format!(
            "capture_{}_{}.png",
            self.captured_at.format("%Y%m%d_%H%M%S"),
            self.id.simple()
        );
        let path = dir.join(name);
        self.image.save_with_format(&path, image::ImageFormat::Png)?;
        tracing::info!(path = %path.display(), "capture saved");
        Ok(path)
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("id", &self.id)
            .field("captured_at", &self.captured_at)
            .field("dimensions", &self.image.dimensions())
            .finish()
    }
}
