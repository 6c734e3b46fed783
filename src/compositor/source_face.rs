/// Overlay preparation from a still "source face" image.
///
/// Runs once per selected image, off the frame pipeline:
///
/// 1. Detect the largest face in the upright image.
/// 2. Crop a padded region around it.
/// 3. Feather the crop with a radial alpha mask so only the face blends in.
use std::fmt;

use image::{imageops, RgbaImage};

use crate::compositor::orientation::FrameOrientation;
use crate::config::SourceFaceConfig;
use crate::detection::{largest_face, DetectionInput, FaceDetector};
use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::geometry::Rect;

/// Feathered face crop, reused for every frame until another face is chosen.
pub struct OverlayAsset {
    image: RgbaImage,
    aspect_ratio: f64,
}

impl OverlayAsset {
    pub fn new(image: RgbaImage) -> FaceSwapResult<Self> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(FaceSwapError::Compositing("overlay image has zero size".into()));
        }
        Ok(Self {
            aspect_ratio: w as f64 / h as f64,
            image,
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Width / height.
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }
}

impl fmt::Debug for OverlayAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayAsset")
            .field("dimensions", &self.image.dimensions())
            .field("aspect_ratio", &self.aspect_ratio)
            .finish()
    }
}

/// Integer crop region, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn prepare_overlay(
    image: &RgbaImage,
    detector: &dyn FaceDetector,
    params: &SourceFaceConfig,
) -> FaceSwapResult<OverlayAsset> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(FaceSwapError::NoFaceFound);
    }

    let observations = detector.detect(&DetectionInput {
        image,
        orientation: FrameOrientation::Up,
        frame_index: None,
    })?;
    let face = largest_face(&observations).ok_or(FaceSwapError::NoFaceFound)?;
    tracing::debug!(
        faces = observations.len(),
        confidence = face.confidence,
        "source face detected"
    );

    let face_px = face.bounding_box.to_pixels(w, h);
    let region = padded_crop_region(&face_px, w, h, params).ok_or(FaceSwapError::NoFaceFound)?;

    let mut cropped = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    apply_radial_mask(&mut cropped, params.mask_inner, params.mask_outer);

    let asset = OverlayAsset::new(cropped)?;
    tracing::info!(
        width = region.width,
        height = region.height,
        aspect = asset.aspect_ratio(),
        "overlay prepared"
    );
    Ok(asset)
}

/// Expand a bottom-left face rect by the configured padding, clip it to the
/// image and convert it to a top-left pixel region. `None` if nothing remains.
pub fn padded_crop_region(
    face_px: &Rect,
    image_w: u32,
    image_h: u32,
    params: &SourceFaceConfig,
) -> Option<CropRegion> {
    let extent = Rect::new(0.0, 0.0, image_w as f64, image_h as f64);
    let expanded = face_px
        .outset(face_px.width * params.padding_x, face_px.height * params.padding_y)
        .intersection(&extent);
    if expanded.is_empty() {
        return None;
    }

    let h = image_h as f64;
    let x0 = floor_px(expanded.x);
    let x1 = ceil_px(expanded.max_x()).min(image_w);
    let y0 = floor_px(h - expanded.max_y());
    let y1 = ceil_px(h - expanded.y).min(image_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(CropRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

// Snap values within float noise of an integer before rounding outward.
const PIXEL_EPS: f64 = 1e-6;

fn floor_px(v: f64) -> u32 {
    (v + PIXEL_EPS).floor().max(0.0) as u32
}

fn ceil_px(v: f64) -> u32 {
    (v - PIXEL_EPS).ceil().max(0.0) as u32
}

/// Multiply alpha by a radial falloff centred on the image: 1 within
/// `inner * min(w, h)`, 0 beyond `outer * max(w, h)`, linear in between.
pub fn apply_radial_mask(img: &mut RgbaImage, inner: f64, outer: f64) {
    let (w, h) = img.dimensions();
    let (wf, hf) = (w as f64, h as f64);
    let r0 = inner * wf.min(hf);
    let r1 = outer * wf.max(hf);
    let (cx, cy) = (wf / 2.0, hf / 2.0);

    for (x, y, px) in img.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        let d = (dx * dx + dy * dy).sqrt();
        let factor = if d <= r0 {
            1.0
        } else if d >= r1 {
            0.0
        } else {
            1.0 - (d - r0) / (r1 - r0)
        };
        px[3] = (px[3] as f64 * factor).round() as u8;
    }
}
