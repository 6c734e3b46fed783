pub mod aspect_fill;
pub mod mapping;
pub mod types;

pub use aspect_fill::{compute_aspect_fill_transform, AspectFillTransform};
pub use mapping::{
    map_point_to_screen, map_rect_to_screen, map_screen_rect_to_buffer, ExpansionPolicy,
    OverlayPlacement,
};
pub use types::{BufferDimensions, NormalizedRect, Point, Rect, Size, ViewportSize};
