use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::geometry::BufferDimensions;

/// How a sensor buffer must be reoriented for display, named after the
/// matching EXIF orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrientation {
    /// Already upright (still images).
    Up,
    /// Rotate 90° clockwise. Back camera.
    Right,
    /// Rotate 90° clockwise, then mirror horizontally (a transpose). Front camera.
    LeftMirrored,
}

impl FrameOrientation {
    pub fn for_camera(is_front_camera: bool) -> Self {
        if is_front_camera {
            FrameOrientation::LeftMirrored
        } else {
            FrameOrientation::Right
        }
    }

    /// Buffer size after orientation.
    pub fn effective_dimensions(&self, native: BufferDimensions) -> BufferDimensions {
        match self {
            FrameOrientation::Up => native,
            FrameOrientation::Right | FrameOrientation::LeftMirrored => native.transposed(),
        }
    }
}

pub fn orient_frame(raw: &RgbaImage, orientation: FrameOrientation) -> RgbaImage {
    match orientation {
        FrameOrientation::Up => raw.clone(),
        FrameOrientation::Right => imageops::rotate90(raw),
        FrameOrientation::LeftMirrored => {
            let mut rotated = imageops::rotate90(raw);
            imageops::flip_horizontal_in_place(&mut rotated);
            rotated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const MARK: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn marked(w: u32, h: u32, x: u32, y: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        img.put_pixel(x, y, MARK);
        img
    }

    #[test]
    fn back_camera_rotates_clockwise() {
        let raw = marked(3, 2, 2, 0);
        let out = orient_frame(&raw, FrameOrientation::Right);
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(*out.get_pixel(1, 2), MARK);
    }

    #[test]
    fn front_camera_transposes() {
        let raw = marked(3, 2, 2, 0);
        let out = orient_frame(&raw, FrameOrientation::LeftMirrored);
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(*out.get_pixel(0, 2), MARK);
    }

    #[test]
    fn effective_dimensions_swap_for_sensor_orientations() {
        let native = BufferDimensions::new(1920, 1080);
        assert_eq!(
            FrameOrientation::for_camera(true).effective_dimensions(native),
            BufferDimensions::new(1080, 1920)
        );
        assert_eq!(
            FrameOrientation::for_camera(false).effective_dimensions(native),
            BufferDimensions::new(1080, 1920)
        );
        assert_eq!(FrameOrientation::Up.effective_dimensions(native), native);
    }
}
