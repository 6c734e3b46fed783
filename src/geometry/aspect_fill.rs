/// Aspect-fill ("cover") layout: content scaled uniformly until it covers the
/// container, with the overflowing axis cropped symmetrically.
use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::geometry::types::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectFillTransform {
    pub scale: f64,
    /// Overflow cropped from each side horizontally, in container units.
    pub offset_x: f64,
    /// Overflow cropped from each side vertically, in container units.
    pub offset_y: f64,
}

impl AspectFillTransform {
    /// Content pixel (top-left origin) to container point.
    pub fn content_to_container(&self, p: Point) -> Point {
        Point::new(p.x * self.scale - self.offset_x, p.y * self.scale - self.offset_y)
    }

    /// Container point to content pixel (top-left origin).
    pub fn container_to_content(&self, p: Point) -> Point {
        Point::new((p.x + self.offset_x) / self.scale, (p.y + self.offset_y) / self.scale)
    }
}

/// Compute the cover transform of `content` into `container`.
///
/// When the content is relatively wider than the container, heights are
/// matched and the horizontal excess is cropped; otherwise widths are matched
/// and the vertical excess is cropped. Either way the scale is the larger of
/// the two axis ratios.
pub fn compute_aspect_fill_transform(
    content_w: f64,
    content_h: f64,
    container_w: f64,
    container_h: f64,
) -> FaceSwapResult<AspectFillTransform> {
    let all_positive = [content_w, content_h, container_w, container_h]
        .iter()
        .all(|v| *v > 0.0 && v.is_finite());
    if !all_positive {
        return Err(FaceSwapError::DegenerateGeometry {
            content_w,
            content_h,
            container_w,
            container_h,
        });
    }

    let content_aspect = content_w / content_h;
    let container_aspect = container_w / container_h;

    let transform = if content_aspect > container_aspect {
        let scale = container_h / content_h;
        AspectFillTransform {
            scale,
            offset_x: (content_w * scale - container_w) / 2.0,
            offset_y: 0.0,
        }
    } else {
        let scale = container_w / content_w;
        AspectFillTransform {
            scale,
            offset_x: 0.0,
            offset_y: (content_h * scale - container_h) / 2.0,
        }
    };
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn portrait_buffer_in_taller_phone_viewport() {
        // 1080/1920 = 0.5625 > 390/844 ≈ 0.4621: content is wider, heights match.
        let t = compute_aspect_fill_transform(1080.0, 1920.0, 390.0, 844.0).unwrap();
        assert!(close(t.scale, 844.0 / 1920.0));
        assert!(close(t.offset_x, 42.375));
        assert_eq!(t.offset_y, 0.0);
        assert!(close(t.scale, (390.0_f64 / 1080.0).max(844.0 / 1920.0)));
    }

    #[test]
    fn landscape_buffer_in_square_viewport_crops_sides() {
        let t = compute_aspect_fill_transform(1920.0, 1080.0, 500.0, 500.0).unwrap();
        assert!(close(t.scale, 500.0 / 1080.0));
        assert!(close(t.offset_x, (1920.0 * 500.0 / 1080.0 - 500.0) / 2.0));
        assert_eq!(t.offset_y, 0.0);
    }

    #[test]
    fn narrow_content_crops_top_and_bottom() {
        let t = compute_aspect_fill_transform(100.0, 100.0, 400.0, 200.0).unwrap();
        assert!(close(t.scale, 4.0));
        assert_eq!(t.offset_x, 0.0);
        assert!(close(t.offset_y, 100.0));
    }

    #[test]
    fn equal_aspect_has_no_offsets() {
        let t = compute_aspect_fill_transform(1080.0, 1920.0, 540.0, 960.0).unwrap();
        assert!(close(t.scale, 0.5));
        assert_eq!(t.offset_x, 0.0);
        assert!(t.offset_y.abs() < 1e-9);
    }

    #[test]
    fn scale_is_cover_and_one_offset_is_zero() {
        let sizes = [1.0, 3.0, 17.5, 390.0, 844.0, 1080.0, 1920.0, 4032.0];
        for &cw in &sizes {
            for &ch in &sizes {
                for &vw in &sizes {
                    for &vh in &sizes {
                        let t = compute_aspect_fill_transform(cw, ch, vw, vh).unwrap();
                        assert!(t.scale > 0.0);
                        assert!(close(t.scale, (vw / cw).max(vh / ch)));
                        assert!(t.offset_x == 0.0 || t.offset_y == 0.0);
                        assert!(t.offset_x >= -1e-6 && t.offset_y >= -1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn zero_or_nan_dimensions_are_degenerate() {
        for args in [
            (0.0, 10.0, 10.0, 10.0),
            (10.0, 0.0, 10.0, 10.0),
            (10.0, 10.0, 0.0, 10.0),
            (10.0, 10.0, 10.0, -1.0),
            (f64::NAN, 10.0, 10.0, 10.0),
            (10.0, f64::INFINITY, 10.0, 10.0),
        ] {
            let err = compute_aspect_fill_transform(args.0, args.1, args.2, args.3).unwrap_err();
            assert!(matches!(err, FaceSwapError::DegenerateGeometry { .. }));
        }
    }

    #[test]
    fn container_round_trip_is_identity() {
        let t = compute_aspect_fill_transform(1080.0, 1920.0, 390.0, 844.0).unwrap();
        let p = Point::new(517.25, 1203.5);
        let back = t.container_to_content(t.content_to_container(p));
        assert!(close(back.x, p.x));
        assert!(close(back.y, p.y));
    }
}
