pub mod frame;
pub mod state;
pub mod worker;

pub use frame::{CapturedImage, FaceOverlayState, Frame, FrameUpdate};
pub use state::{FramePermit, InFlightGuard, PipelinePhase, PipelineStats};
pub use worker::{FramePipeline, SubmitOutcome};
