pub mod capture;
pub mod orientation;
pub mod source_face;

pub use capture::{CaptureCompositor, CaptureContext};
pub use orientation::{orient_frame, FrameOrientation};
pub use source_face::{prepare_overlay, OverlayAsset};
