/// Frame pipeline: at most one frame in flight, newer frames dropped while
/// busy, detection and compositing on a blocking thread.
///
/// 1. `submit` claims the in-flight guard and hands the frame to the worker.
/// 2. The worker takes any armed capture request.
/// 3. Detection, selection and mapping run off the async runtime.
/// 4. The update is published (newest sequence wins) and the capture, if
///    any, is composited from the same frame and delivered.
/// 5. The permit is dropped and the guard returns to idle.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;
use tokio::sync::{mpsc, watch};

use crate::compositor::{CaptureCompositor, CaptureContext};
use crate::config::AppConfig;
use crate::detection::{select_best_face, DetectionInput, DetectionResult, FaceDetector};
use crate::errors::FaceSwapResult;
use crate::geometry::Size;
use crate::pipeline::frame::{CapturedImage, FaceOverlayState, Frame, FrameUpdate};
use crate::pipeline::state::{FramePermit, InFlightGuard, PipelineCounters, PipelinePhase, PipelineStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { sequence: u64 },
    /// Another frame is in flight.
    Dropped,
    /// The pipeline has been shut down.
    Stopped,
}

struct PipelineShared {
    guard: Arc<InFlightGuard>,
    counters: PipelineCounters,
    alive: AtomicBool,
    next_sequence: AtomicU64,
    viewport: Mutex<Size>,
    pending_capture: Mutex<Option<CaptureContext>>,
}

impl PipelineShared {
    fn viewport(&self) -> Size {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending_capture(&self) -> Option<CaptureContext> {
        self.pending_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

struct Job {
    frame: Frame,
    sequence: u64,
    permit: FramePermit,
}

struct Processed {
    update: FrameUpdate,
    capture: Option<FaceSwapResult<RgbaImage>>,
}

pub struct FramePipeline {
    shared: Arc<PipelineShared>,
    job_tx: mpsc::Sender<Job>,
    updates_rx: watch::Receiver<FrameUpdate>,
}

impl FramePipeline {
    /// Start the worker task. Must be called inside a tokio runtime.
    ///
    /// Returns the pipeline handle and the receiving end for composed captures.
    pub fn spawn(
        detector: Arc<dyn FaceDetector>,
        config: &AppConfig,
    ) -> (Self, mpsc::Receiver<CapturedImage>) {
        let shared = Arc::new(PipelineShared {
            guard: Arc::new(InFlightGuard::new()),
            counters: PipelineCounters::default(),
            alive: AtomicBool::new(true),
            next_sequence: AtomicU64::new(0),
            viewport: Mutex::new(Size::ZERO),
            pending_capture: Mutex::new(None),
        });
        let (job_tx, job_rx) = mpsc::channel::<Job>(1);
        let (updates_tx, updates_rx) = watch::channel(FrameUpdate::default());
        let (captures_tx, captures_rx) = mpsc::channel(config.pipeline.capture_buffer.max(1));

        let worker = Worker {
            shared: Arc::clone(&shared),
            detector,
            compositor: Arc::new(CaptureCompositor::new(config.geometry.expansion_policy())),
            threshold: config.detection.confidence_threshold,
            updates_tx,
            captures_tx,
        };
        tokio::spawn(async move {
            worker.run(job_rx).await;
            tracing::info!("frame pipeline worker exited");
        });

        (
            Self {
                shared,
                job_tx,
                updates_rx,
            },
            captures_rx,
        )
    }

    /// Offer a frame. Never blocks; a busy pipeline drops the frame.
    pub fn submit(&self, frame: Frame) -> SubmitOutcome {
        if !self.is_alive() {
            return SubmitOutcome::Stopped;
        }
        let Some(permit) = self.shared.guard.try_acquire() else {
            PipelineCounters::bump(&self.shared.counters.dropped);
            tracing::trace!(index = frame.index, "pipeline busy; frame dropped");
            return SubmitOutcome::Dropped;
        };
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        match self.job_tx.try_send(Job { frame, sequence, permit }) {
            Ok(()) => {
                PipelineCounters::bump(&self.shared.counters.accepted);
                SubmitOutcome::Accepted { sequence }
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                PipelineCounters::bump(&self.shared.counters.dropped);
                SubmitOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SubmitOutcome::Stopped,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameUpdate> {
        self.updates_rx.clone()
    }

    /// Most recently published update.
    pub fn latest(&self) -> FrameUpdate {
        self.updates_rx.borrow().clone()
    }

    /// Composite the next processed frame with `ctx`. A request armed before
    /// that frame is taken replaces the earlier one.
    pub fn arm_capture(&self, ctx: CaptureContext) {
        let previous = self
            .shared
            .pending_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ctx);
        if previous.is_some() {
            tracing::debug!("pending capture replaced");
        }
    }

    pub fn has_pending_capture(&self) -> bool {
        self.shared
            .pending_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set_viewport(&self, viewport: Size) {
        *self.shared.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    pub fn viewport(&self) -> Size {
        self.shared.viewport()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.shared.guard.phase()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot(&self.shared.guard)
    }

    /// Stop accepting frames. A frame already in flight finishes but its
    /// results are discarded.
    pub fn shutdown(&self) {
        if self.shared.alive.swap(false, Ordering::AcqRel) {
            self.shared.take_pending_capture();
            tracing::info!("frame pipeline shut down");
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }
}

struct Worker {
    shared: Arc<PipelineShared>,
    detector: Arc<dyn FaceDetector>,
    compositor: Arc<CaptureCompositor>,
    threshold: f32,
    updates_tx: watch::Sender<FrameUpdate>,
    captures_tx: mpsc::Sender<CapturedImage>,
}

impl Worker {
    async fn run(self, mut job_rx: mpsc::Receiver<Job>) {
        while let Some(Job { frame, sequence, permit }) = job_rx.recv().await {
            let capture = self.shared.take_pending_capture();
            let viewport = self.shared.viewport();
            let detector = Arc::clone(&self.detector);
            let compositor = Arc::clone(&self.compositor);
            let threshold = self.threshold;

            let joined = tokio::task::spawn_blocking(move || {
                let processed = process_frame(
                    detector.as_ref(),
                    &compositor,
                    &frame,
                    sequence,
                    viewport,
                    threshold,
                    &permit,
                    capture,
                );
                (processed, permit)
            })
            .await;

            // A panicking detector drops the permit while unwinding.
            let (processed, permit) = match joined {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(sequence, error = %e, "frame processing task failed");
                    continue;
                }
            };

            if !self.shared.alive.load(Ordering::Acquire) {
                PipelineCounters::bump(&self.shared.counters.stale_discarded);
                tracing::debug!(sequence, "pipeline stopped; result discarded");
                drop(permit);
                continue;
            }

            if !publish_if_newer(&self.updates_tx, processed.update) {
                PipelineCounters::bump(&self.shared.counters.stale_discarded);
                tracing::debug!(sequence, "stale update discarded");
            }

            match processed.capture {
                Some(Ok(image)) => self.deliver_capture(CapturedImage::new(image)),
                Some(Err(e)) => {
                    PipelineCounters::bump(&self.shared.counters.captures_failed);
                    tracing::warn!(sequence, error = %e, "capture compositing failed");
                }
                None => {}
            }

            PipelineCounters::bump(&self.shared.counters.completed);
            drop(permit);
        }
    }

    fn deliver_capture(&self, capture: CapturedImage) {
        let id = capture.id;
        match self.captures_tx.try_send(capture) {
            Ok(()) => {
                PipelineCounters::bump(&self.shared.counters.captures_delivered);
                tracing::info!(%id, "capture delivered");
            }
            Err(e) => {
                PipelineCounters::bump(&self.shared.counters.captures_failed);
                tracing::warn!(%id, error = %e, "capture could not be delivered");
            }
        }
    }
}

/// Replace the published update unless a newer one is already there.
fn publish_if_newer(tx: &watch::Sender<FrameUpdate>, update: FrameUpdate) -> bool {
    tx.send_if_modified(move |current| {
        if update.sequence > current.sequence {
            *current = update;
            true
        } else {
            false
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn process_frame(
    detector: &dyn FaceDetector,
    compositor: &CaptureCompositor,
    frame: &Frame,
    sequence: u64,
    viewport: Size,
    threshold: f32,
    permit: &FramePermit,
    capture: Option<CaptureContext>,
) -> Processed {
    let buffer = frame.effective_dimensions();
    let input = DetectionInput {
        image: &frame.pixels,
        orientation: frame.orientation(),
        frame_index: Some(frame.index),
    };
    let observations = match detector.detect(&input) {
        Ok(obs) => obs,
        Err(e) => {
            tracing::warn!(index = frame.index, error = %e, "detection failed; treating as no face");
            Vec::new()
        }
    };

    let detection = select_best_face(&observations, threshold)
        .map(|obs| DetectionResult::from_observation(obs, buffer));
    permit.resolve(detection.is_some());
    let face = detection
        .as_ref()
        .and_then(|d| FaceOverlayState::from_detection(d, viewport));
    tracing::trace!(
        index = frame.index,
        sequence,
        faces = observations.len(),
        found = face.is_some(),
        "frame processed"
    );

    let capture = capture.map(|ctx| compositor.composite(&frame.pixels, &ctx));

    Processed {
        update: FrameUpdate {
            sequence,
            frame_index: frame.index,
            buffer,
            viewport,
            face,
        },
        capture,
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("alive", &self.is_alive())
            .field("phase", &self.phase())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraFacing;
    use crate::detection::{FaceObservation, ReplayDetector};
    use crate::errors::FaceSwapError;
    use crate::geometry::{NormalizedRect, Rect};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn face(confidence: f32) -> FaceObservation {
        FaceObservation {
            bounding_box: NormalizedRect::new(0.25, 0.25, 0.5, 0.5),
            confidence,
            roll: None,
            landmarks: None,
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, Arc::new(RgbaImage::new(20, 40)), CameraFacing::Back)
    }

    /// Blocks every detection until the test releases it.
    struct GatedDetector {
        gate: Mutex<std_mpsc::Receiver<()>>,
        faces: Vec<FaceObservation>,
    }

    impl FaceDetector for GatedDetector {
        fn detect(&self, _input: &DetectionInput<'_>) -> FaceSwapResult<Vec<FaceObservation>> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(self.faces.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _input: &DetectionInput<'_>) -> FaceSwapResult<Vec<FaceObservation>> {
            Err(FaceSwapError::Detection("model unavailable".into()))
        }
    }

    fn gated(faces: Vec<FaceObservation>) -> (Arc<GatedDetector>, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Arc::new(GatedDetector {
                gate: Mutex::new(rx),
                faces,
            }),
            tx,
        )
    }

    async fn wait_idle(pipeline: &FramePipeline, releases: u64) {
        tokio::time::timeout(WAIT, async {
            while pipeline.stats().guard_releases < releases || pipeline.phase() != PipelinePhase::Idle {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("pipeline never went idle");
    }

    #[tokio::test]
    async fn frames_arriving_while_busy_are_dropped() {
        let (detector, release) = gated(vec![face(0.9)]);
        let (pipeline, _captures) = FramePipeline::spawn(detector, &AppConfig::default());
        pipeline.set_viewport(Size::new(40.0, 20.0));

        assert_eq!(pipeline.submit(frame(1)), SubmitOutcome::Accepted { sequence: 1 });
        assert_eq!(pipeline.submit(frame(2)), SubmitOutcome::Dropped);
        assert_eq!(pipeline.submit(frame(3)), SubmitOutcome::Dropped);

        release.send(()).unwrap();
        wait_idle(&pipeline, 1).await;

        let update = pipeline.latest();
        assert_eq!(update.sequence, 1);
        assert_eq!(update.frame_index, 1);
        assert!(update.face.is_some());

        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.guard_releases, stats.accepted);

        release.send(()).unwrap();
        assert_eq!(pipeline.submit(frame(4)), SubmitOutcome::Accepted { sequence: 2 });
        wait_idle(&pipeline, 2).await;
        assert_eq!(pipeline.latest().frame_index, 4);
    }

    #[tokio::test]
    async fn low_confidence_face_publishes_no_face() {
        let detector = Arc::new(ReplayDetector::constant(vec![face(0.44)]));
        let (pipeline, _captures) = FramePipeline::spawn(detector, &AppConfig::default());
        pipeline.set_viewport(Size::new(40.0, 20.0));
        let mut updates = pipeline.subscribe();

        pipeline.submit(frame(0));
        let update = tokio::time::timeout(WAIT, updates.wait_for(|u| u.sequence == 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert!(update.face.is_none());
    }

    #[tokio::test]
    async fn detector_errors_count_as_no_face() {
        let (pipeline, _captures) = FramePipeline::spawn(Arc::new(FailingDetector), &AppConfig::default());
        pipeline.submit(frame(0));
        wait_idle(&pipeline, 1).await;
        let update = pipeline.latest();
        assert_eq!(update.sequence, 1);
        assert!(update.face.is_none());
        assert!(pipeline.is_alive());
    }

    #[tokio::test]
    async fn armed_capture_is_consumed_exactly_once() {
        let detector = Arc::new(ReplayDetector::constant(vec![face(0.9)]));
        let (pipeline, mut captures) = FramePipeline::spawn(detector, &AppConfig::default());
        let viewport = Size::new(40.0, 20.0);
        pipeline.set_viewport(viewport);

        let buffer = frame(0).effective_dimensions();
        pipeline.arm_capture(CaptureContext::new(None, Rect::ZERO, viewport, buffer, false));
        assert!(pipeline.has_pending_capture());

        pipeline.submit(frame(1));
        let capture = tokio::time::timeout(WAIT, captures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(capture.image.dimensions(), (40, 20));
        assert!(!pipeline.has_pending_capture());

        wait_idle(&pipeline, 1).await;
        pipeline.submit(frame(2));
        wait_idle(&pipeline, 2).await;
        assert!(captures.try_recv().is_err());
        assert_eq!(pipeline.stats().captures_delivered, 1);
    }

    #[tokio::test]
    async fn results_after_shutdown_are_discarded() {
        let (detector, release) = gated(vec![face(0.9)]);
        let (pipeline, _captures) = FramePipeline::spawn(detector, &AppConfig::default());

        assert!(matches!(pipeline.submit(frame(1)), SubmitOutcome::Accepted { .. }));
        pipeline.shutdown();
        release.send(()).unwrap();
        wait_idle(&pipeline, 1).await;

        assert_eq!(pipeline.latest().sequence, 0);
        assert_eq!(pipeline.stats().stale_discarded, 1);
        assert_eq!(pipeline.submit(frame(2)), SubmitOutcome::Stopped);
    }

    #[test]
    fn older_sequence_never_overwrites_newer() {
        let (tx, rx) = watch::channel(FrameUpdate::default());
        assert!(publish_if_newer(&tx, FrameUpdate { sequence: 3, frame_index: 30, ..Default::default() }));
        assert!(!publish_if_newer(&tx, FrameUpdate { sequence: 2, frame_index: 20, ..Default::default() }));
        assert_eq!(rx.borrow().frame_index, 30);
    }
}
