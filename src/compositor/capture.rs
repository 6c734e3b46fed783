/// Final-image compositing for a capture request.
///
/// The overlay is placed where the user saw it: the on-screen face rect from
/// the [`CaptureContext`] is expanded with the same policy the preview uses,
/// mapped back into buffer pixels and blended over the oriented frame.
use std::sync::Arc;

use image::{imageops, imageops::FilterType, RgbaImage};

use crate::compositor::orientation::{orient_frame, FrameOrientation};
use crate::compositor::source_face::OverlayAsset;
use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::geometry::{map_screen_rect_to_buffer, BufferDimensions, ExpansionPolicy, Rect, Size};

/// An overlay this many times larger than the frame is a mapping error.
const MAX_OVERLAY_TO_FRAME: f64 = 8.0;

/// Everything the compositor needs, captured in one step when the user asks
/// for a capture. Not `Clone`: it is moved into the pending slot and moved
/// out exactly once.
#[derive(Debug)]
pub struct CaptureContext {
    overlay: Option<Arc<OverlayAsset>>,
    overlay_rect: Rect,
    viewport: Size,
    buffer: BufferDimensions,
    is_front_camera: bool,
    overlay_aspect_ratio: f64,
}

impl CaptureContext {
    pub fn new(
        overlay: Option<Arc<OverlayAsset>>,
        overlay_rect: Rect,
        viewport: Size,
        buffer: BufferDimensions,
        is_front_camera: bool,
    ) -> Self {
        let overlay_aspect_ratio = overlay.as_ref().map(|o| o.aspect_ratio()).unwrap_or(1.0);
        Self {
            overlay,
            overlay_rect,
            viewport,
            buffer,
            is_front_camera,
            overlay_aspect_ratio,
        }
    }

    pub fn overlay(&self) -> Option<&Arc<OverlayAsset>> {
        self.overlay.as_ref()
    }

    /// On-screen face rect at the moment of the request.
    pub fn overlay_rect(&self) -> Rect {
        self.overlay_rect
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn buffer(&self) -> BufferDimensions {
        self.buffer
    }

    pub fn is_front_camera(&self) -> bool {
        self.is_front_camera
    }

    pub fn overlay_aspect_ratio(&self) -> f64 {
        self.overlay_aspect_ratio
    }

    /// Inverse-map a screen rect using this snapshot's buffer and viewport.
    /// Result is in bottom-left buffer pixels.
    pub fn map_screen_rect_to_buffer(&self, screen_rect: &Rect) -> FaceSwapResult<Rect> {
        map_screen_rect_to_buffer(screen_rect, self.buffer, self.viewport)
    }

    /// Where the overlay lands in the buffer, or `None` when there is nothing
    /// to draw (no overlay, no face, degenerate snapshot).
    pub fn destination_rect(&self, policy: &ExpansionPolicy) -> Option<Rect> {
        self.overlay.as_ref()?;
        if !self.buffer.is_drawable() || !self.viewport.is_drawable() {
            return None;
        }
        let screen = policy.expand(&self.overlay_rect, self.overlay_aspect_ratio);
        if screen.is_empty() {
            return None;
        }
        self.map_screen_rect_to_buffer(&screen).ok()
    }
}

pub struct CaptureCompositor {
    policy: ExpansionPolicy,
}

impl CaptureCompositor {
    pub fn new(policy: ExpansionPolicy) -> Self {
        Self { policy }
    }

    /// Orient `raw` for display and blend the overlay over it.
    ///
    /// Without an overlay or a face the oriented frame is returned as is.
    pub fn composite(&self, raw: &RgbaImage, ctx: &CaptureContext) -> FaceSwapResult<RgbaImage> {
        let orientation = FrameOrientation::for_camera(ctx.is_front_camera());
        let mut base = orient_frame(raw, orientation);

        let (Some(overlay), Some(dest)) = (ctx.overlay(), ctx.destination_rect(&self.policy)) else {
            tracing::debug!("capture without overlay");
            return Ok(base);
        };

        let (bw, bh) = base.dimensions();
        if BufferDimensions::new(bw, bh) != ctx.buffer() {
            return Err(FaceSwapError::Compositing(format!(
                "frame is {bw}x{bh} but capture was requested against {}x{}",
                ctx.buffer().width,
                ctx.buffer().height
            )));
        }

        if dest.width > bw as f64 * MAX_OVERLAY_TO_FRAME || dest.height > bh as f64 * MAX_OVERLAY_TO_FRAME {
            return Err(FaceSwapError::Compositing(format!(
                "overlay destination {:.0}x{:.0} is out of proportion to the frame",
                dest.width, dest.height
            )));
        }

        // Bottom-left buffer rect to top-left raster edges. The size comes
        // from the rounded edges so both sides land on round(edge).
        let left = dest.x.round() as i64;
        let right = dest.max_x().round() as i64;
        let top = (bh as f64 - dest.max_y()).round() as i64;
        let bottom = (bh as f64 - dest.y).round() as i64;
        if right <= left || bottom <= top {
            tracing::debug!("overlay destination rounds to nothing");
            return Ok(base);
        }
        let (dest_w, dest_h) = ((right - left) as u32, (bottom - top) as u32);

        // Independent x/y scale: fill the destination exactly.
        let scaled = imageops::resize(overlay.image(), dest_w, dest_h, FilterType::Triangle);
        imageops::overlay(&mut base, &scaled, left, top);

        tracing::debug!(left, top, dest_w, dest_h, "overlay composited");
        Ok(base)
    }
}
