use std::sync::Arc;

use async_trait::async_trait;

use crate::camera::CameraFacing;
use crate::errors::FaceSwapResult;
use crate::pipeline::{Frame, FramePipeline, SubmitOutcome};

/// Where a capture source delivers frames. Delivery never blocks: frames that
/// arrive while the pipeline is busy are dropped.
#[derive(Clone)]
pub struct FrameSink {
    pipeline: Arc<FramePipeline>,
}

impl FrameSink {
    pub fn new(pipeline: Arc<FramePipeline>) -> Self {
        Self { pipeline }
    }

    pub fn deliver(&self, frame: Frame) -> SubmitOutcome {
        self.pipeline.submit(frame)
    }
}

/// A camera, or anything that produces frames like one.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Begin delivering frames to `sink`. Restarting replaces the previous sink.
    async fn start(&self, sink: FrameSink) -> FaceSwapResult<()>;

    /// Stop delivery. When this returns no further frame reaches the sink.
    async fn stop(&self);

    /// Flip between front and back camera; returns the new facing.
    async fn switch_facing(&self) -> CameraFacing;

    fn facing(&self) -> CameraFacing;
}
