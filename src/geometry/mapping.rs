/// Forward (normalized buffer → screen) and inverse (screen → buffer pixel)
/// mapping under aspect-fill, plus the overlay expansion policy shared by the
/// on-screen placement and the capture compositor.
use serde::{Deserialize, Serialize};

use crate::errors::FaceSwapResult;
use crate::geometry::aspect_fill::{compute_aspect_fill_transform, AspectFillTransform};
use crate::geometry::types::{BufferDimensions, NormalizedRect, Point, Rect, Size};

fn transform_for(buffer: BufferDimensions, viewport: Size) -> FaceSwapResult<AspectFillTransform> {
    let content = buffer.as_size();
    compute_aspect_fill_transform(content.width, content.height, viewport.width, viewport.height)
}

/// Map a vision-style normalized rect into viewport coordinates (top-left origin).
///
/// Returns `Rect::ZERO` when the buffer or viewport is degenerate; a missing
/// mapping is a normal per-frame condition.
pub fn map_rect_to_screen(rect: &NormalizedRect, buffer: BufferDimensions, viewport: Size) -> Rect {
    let Ok(t) = transform_for(buffer, viewport) else {
        return Rect::ZERO;
    };
    let (bw, bh) = (buffer.width as f64, buffer.height as f64);

    let pixel_x = rect.x * bw;
    let pixel_y = (1.0 - rect.y - rect.height) * bh;
    let pixel_w = rect.width * bw;
    let pixel_h = rect.height * bh;

    let origin = t.content_to_container(Point::new(pixel_x, pixel_y));
    Rect::new(origin.x, origin.y, pixel_w * t.scale, pixel_h * t.scale)
}

/// Point-wise variant of [`map_rect_to_screen`] for landmark centroids.
pub fn map_point_to_screen(point: Point, buffer: BufferDimensions, viewport: Size) -> Point {
    let Ok(t) = transform_for(buffer, viewport) else {
        return Point::ZERO;
    };
    let pixel = Point::new(point.x * buffer.width as f64, (1.0 - point.y) * buffer.height as f64);
    t.content_to_container(pixel)
}

/// Invert the forward mapping for a screen rect.
///
/// The result is in buffer pixels with a bottom-left origin, the convention
/// the compositor positions overlays in.
pub fn map_screen_rect_to_buffer(
    screen_rect: &Rect,
    buffer: BufferDimensions,
    viewport: Size,
) -> FaceSwapResult<Rect> {
    let t = transform_for(buffer, viewport)?;
    let center_top_left = t.container_to_content(screen_rect.center());
    let center = Point::new(center_top_left.x, buffer.height as f64 - center_top_left.y);
    Ok(Rect::centered(
        center,
        screen_rect.width / t.scale,
        screen_rect.height / t.scale,
    ))
}

/// How far the overlay extends beyond the detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpansionPolicy {
    pub width_factor: f64,
    pub vertical_nudge: f64,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            width_factor: 1.8,
            vertical_nudge: 0.03,
        }
    }
}

impl ExpansionPolicy {
    /// Overlay rect on screen for a face rect and an overlay aspect ratio
    /// (width / height). Empty when the face rect or aspect ratio is unusable.
    pub fn expand(&self, face_rect: &Rect, aspect_ratio: f64) -> Rect {
        if face_rect.is_empty() || !(aspect_ratio > 0.0) || !aspect_ratio.is_finite() {
            return Rect::ZERO;
        }
        let width = face_rect.width * self.width_factor;
        let height = width / aspect_ratio;
        let center = Point::new(
            face_rect.mid_x(),
            face_rect.mid_y() - face_rect.height * self.vertical_nudge,
        );
        Rect::centered(center, width, height)
    }
}

/// Where and how the overlay is drawn on screen for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayPlacement {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    /// Radians, the face roll.
    pub rotation: f64,
    pub opacity: f64,
}

impl OverlayPlacement {
    pub fn for_face(
        face_rect: &Rect,
        roll: f64,
        aspect_ratio: f64,
        policy: &ExpansionPolicy,
        opacity: f64,
    ) -> Option<Self> {
        let rect = policy.expand(face_rect, aspect_ratio);
        if rect.is_empty() {
            return None;
        }
        Some(Self {
            center: rect.center(),
            width: rect.width,
            height: rect.height,
            rotation: roll,
            opacity: opacity.clamp(0.0, 1.0),
        })
    }

    pub fn rect(&self) -> Rect {
        Rect::centered(self.center, self.width, self.height)
    }
}
