/// Live face-swap session: owns the capture source, the frame pipeline and the
/// selected overlay, and turns user actions into pipeline requests.
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;
use tokio::sync::{mpsc, watch};

use crate::camera::{CameraFacing, CaptureSource, FrameSink};
use crate::compositor::{prepare_overlay, CaptureContext, OverlayAsset};
use crate::config::AppConfig;
use crate::detection::FaceDetector;
use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::geometry::{OverlayPlacement, Rect, Size};
use crate::pipeline::{CapturedImage, FramePipeline, FrameUpdate, PipelinePhase, PipelineStats};

struct ActivePipeline {
    pipeline: Arc<FramePipeline>,
    captures: Arc<tokio::sync::Mutex<mpsc::Receiver<CapturedImage>>>,
}

pub struct LiveSwapSession {
    config: AppConfig,
    detector: Arc<dyn FaceDetector>,
    still_detector: Arc<dyn FaceDetector>,
    source: Arc<dyn CaptureSource>,
    viewport: Mutex<Size>,
    overlay: Mutex<Option<Arc<OverlayAsset>>>,
    active: Mutex<Option<ActivePipeline>>,
    gallery: Mutex<Vec<CapturedImage>>,
}

impl LiveSwapSession {
    pub fn new(config: AppConfig, detector: Arc<dyn FaceDetector>, source: Arc<dyn CaptureSource>) -> Self {
        Self {
            config,
            still_detector: Arc::clone(&detector),
            detector,
            source,
            viewport: Mutex::new(Size::ZERO),
            overlay: Mutex::new(None),
            active: Mutex::new(None),
            gallery: Mutex::new(Vec::new()),
        }
    }

    /// Use a different detector for the source still image.
    pub fn with_still_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.still_detector = detector;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn pipeline(&self) -> Option<Arc<FramePipeline>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| Arc::clone(&a.pipeline))
    }

    fn running_pipeline(&self) -> FaceSwapResult<Arc<FramePipeline>> {
        self.pipeline()
            .filter(|p| p.is_alive())
            .ok_or_else(|| FaceSwapError::Camera("camera is not running".into()))
    }

    /// Start the pipeline (a fresh one after a stop) and the capture source.
    pub async fn start_camera(&self) -> FaceSwapResult<()> {
        let pipeline = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            match active.as_ref() {
                Some(a) if a.pipeline.is_alive() => Arc::clone(&a.pipeline),
                _ => {
                    let (pipeline, captures) = FramePipeline::spawn(Arc::clone(&self.detector), &self.config);
                    let pipeline = Arc::new(pipeline);
                    *active = Some(ActivePipeline {
                        pipeline: Arc::clone(&pipeline),
                        captures: Arc::new(tokio::sync::Mutex::new(captures)),
                    });
                    pipeline
                }
            }
        };
        pipeline.set_viewport(self.viewport());
        self.source.start(FrameSink::new(pipeline)).await?;
        tracing::info!(facing = ?self.source.facing(), "camera started");
        Ok(())
    }

    /// Stop the source first so no frame arrives after the pipeline is shut down.
    pub async fn stop_camera(&self) {
        self.source.stop().await;
        if let Some(pipeline) = self.pipeline() {
            pipeline.shutdown();
        }
        tracing::info!("camera stopped");
    }

    pub async fn switch_camera(&self) -> CameraFacing {
        self.source.switch_facing().await
    }

    pub fn facing(&self) -> CameraFacing {
        self.source.facing()
    }

    pub fn set_viewport(&self, viewport: Size) {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
        if let Some(pipeline) = self.pipeline() {
            pipeline.set_viewport(viewport);
        }
        tracing::debug!(width = viewport.width, height = viewport.height, "viewport set");
    }

    pub fn viewport(&self) -> Size {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepare the overlay from a still image. On `NoFaceFound` the previous
    /// overlay, if any, stays selected.
    pub async fn select_source_image(&self, image: RgbaImage) -> FaceSwapResult<()> {
        let detector = Arc::clone(&self.still_detector);
        let params = self.config.source_face.clone();
        let asset = tokio::task::spawn_blocking(move || prepare_overlay(&image, detector.as_ref(), &params))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    FaceSwapError::Cancelled
                } else {
                    FaceSwapError::Detection(format!("join: {e}"))
                }
            })?;
        match asset {
            Ok(asset) => {
                *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(asset));
                Ok(())
            }
            Err(e) => {
                tracing::info!(error = %e, "source image rejected");
                Err(e)
            }
        }
    }

    pub fn clear_face(&self) {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_swapping(&self) -> bool {
        self.overlay().is_some()
    }

    fn overlay(&self) -> Option<Arc<OverlayAsset>> {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn latest_update(&self) -> FrameUpdate {
        self.pipeline().map(|p| p.latest()).unwrap_or_default()
    }

    pub fn subscribe_updates(&self) -> FaceSwapResult<watch::Receiver<FrameUpdate>> {
        self.pipeline()
            .map(|p| p.subscribe())
            .ok_or_else(|| FaceSwapError::Camera("camera was never started".into()))
    }

    /// Where the overlay goes on screen for the latest face. `None` without an
    /// overlay or a face.
    pub fn overlay_placement(&self) -> Option<OverlayPlacement> {
        let overlay = self.overlay()?;
        let update = self.latest_update();
        let face = update.face?;
        OverlayPlacement::for_face(
            &face.face_rect,
            face.roll,
            overlay.aspect_ratio(),
            &self.config.geometry.expansion_policy(),
            self.config.geometry.overlay_opacity,
        )
    }

    /// Snapshot what is on screen now and composite it into the next
    /// processed frame. Without an overlay or a face the capture is the
    /// plain frame.
    pub fn request_capture(&self) -> FaceSwapResult<()> {
        let pipeline = self.running_pipeline()?;
        let ctx = self.capture_context(&pipeline.latest());
        tracing::info!(swapping = ctx.overlay().is_some(), "capture requested");
        pipeline.arm_capture(ctx);
        Ok(())
    }

    /// The face rect, viewport and buffer all come from the same update so
    /// the inverse mapping sees the transform the rect was drawn with.
    fn capture_context(&self, update: &FrameUpdate) -> CaptureContext {
        let overlay_rect = update.face.as_ref().map(|f| f.face_rect).unwrap_or(Rect::ZERO);
        tracing::debug!(sequence = update.sequence, "capture snapshot");
        CaptureContext::new(
            self.overlay(),
            overlay_rect,
            update.viewport,
            update.buffer,
            self.source.facing().is_front(),
        )
    }

    /// Wait for the next composed capture and add it to the gallery.
    /// `None` once the pipeline has gone away.
    pub async fn next_capture(&self) -> Option<CapturedImage> {
        let captures = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| Arc::clone(&a.captures))?;
        let capture = captures.lock().await.recv().await?;
        self.push_gallery(capture.clone());
        Some(capture)
    }

    /// Collect captures that are already waiting, without blocking.
    pub fn drain_captures(&self) -> Vec<CapturedImage> {
        let Some(captures) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| Arc::clone(&a.captures))
        else {
            return Vec::new();
        };
        let Ok(mut rx) = captures.try_lock() else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        while let Ok(capture) = rx.try_recv() {
            self.push_gallery(capture.clone());
            drained.push(capture);
        }
        drained
    }

    fn push_gallery(&self, capture: CapturedImage) {
        self.gallery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, capture);
    }

    /// Captures so far, newest first.
    pub fn gallery(&self) -> Vec<CapturedImage> {
        self.gallery.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A frame is between detection start and permit release.
    pub fn is_processing(&self) -> bool {
        self.pipeline().is_some_and(|p| p.phase() != PipelinePhase::Idle)
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline().map(|p| p.stats()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{FaceObservation, ReplayDetector};
    use crate::geometry::NormalizedRect;
    use crate::pipeline::{Frame, SubmitOutcome};
    use async_trait::async_trait;
    use image::Rgba;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Source whose frames are pushed by the test.
    struct ManualSource {
        sink: Mutex<Option<FrameSink>>,
        facing: Mutex<CameraFacing>,
    }

    impl ManualSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sink: Mutex::new(None),
                facing: Mutex::new(CameraFacing::Back),
            })
        }

        fn push(&self, index: u64) -> Option<SubmitOutcome> {
            let sink = self.sink.lock().unwrap().clone()?;
            Some(sink.deliver(Frame::new(index, Arc::new(RgbaImage::new(20, 40)), self.facing())))
        }
    }

    #[async_trait]
    impl CaptureSource for ManualSource {
        async fn start(&self, sink: FrameSink) -> FaceSwapResult<()> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        async fn stop(&self) {
            self.sink.lock().unwrap().take();
        }

        async fn switch_facing(&self) -> CameraFacing {
            let mut facing = self.facing.lock().unwrap();
            *facing = facing.toggled();
            *facing
        }

        fn facing(&self) -> CameraFacing {
            *self.facing.lock().unwrap()
        }
    }

    fn centered_face() -> FaceObservation {
        FaceObservation {
            bounding_box: NormalizedRect::new(0.25, 0.25, 0.5, 0.5),
            confidence: 0.9,
            roll: Some(0.2),
            landmarks: None,
        }
    }

    fn session(source: Arc<ManualSource>, faces: Vec<FaceObservation>) -> LiveSwapSession {
        LiveSwapSession::new(
            AppConfig::default(),
            Arc::new(ReplayDetector::constant(faces)),
            source,
        )
    }

    async fn wait_processed(session: &LiveSwapSession, sequence: u64) {
        tokio::time::timeout(WAIT, async {
            while session.latest_update().sequence < sequence
                || session.pipeline().map(|p| p.phase()) != Some(PipelinePhase::Idle)
            {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("frame was not processed");
    }

    #[tokio::test]
    async fn source_image_without_face_is_rejected() {
        let session = session(ManualSource::new(), Vec::new());
        let err = session
            .select_source_image(RgbaImage::from_pixel(64, 64, Rgba([200, 150, 120, 255])))
            .await
            .unwrap_err();
        assert!(matches!(err, FaceSwapError::NoFaceFound));
        assert!(!session.is_swapping());
    }

    #[tokio::test]
    async fn capture_requires_a_running_camera() {
        let session = session(ManualSource::new(), Vec::new());
        assert!(matches!(session.request_capture(), Err(FaceSwapError::Camera(_))));
        assert!(session.subscribe_updates().is_err());
    }

    #[tokio::test]
    async fn swap_then_capture_lands_in_gallery() {
        let source = ManualSource::new();
        let session = session(Arc::clone(&source), vec![centered_face()]);
        session.set_viewport(Size::new(40.0, 20.0));
        session
            .select_source_image(RgbaImage::from_pixel(100, 100, Rgba([200, 150, 120, 255])))
            .await
            .unwrap();
        assert!(session.is_swapping());
        assert!(session.overlay_placement().is_none());

        session.start_camera().await.unwrap();
        assert!(matches!(source.push(0), Some(SubmitOutcome::Accepted { .. })));
        wait_processed(&session, 1).await;

        let placement = session.overlay_placement().unwrap();
        assert!((placement.center.x - 20.0).abs() < 1e-9);
        assert!((placement.width - 36.0).abs() < 1e-9);
        assert_eq!(placement.rotation, 0.2);
        assert_eq!(placement.opacity, 0.88);

        session.request_capture().unwrap();
        source.push(1);
        let capture = tokio::time::timeout(WAIT, session.next_capture())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(capture.image.dimensions(), (40, 20));
        assert_eq!(session.gallery().len(), 1);
        assert_eq!(session.stats().captures_delivered, 1);

        session.clear_face();
        assert!(session.overlay_placement().is_none());
    }

    #[tokio::test]
    async fn stop_then_restart_uses_a_fresh_pipeline() {
        let source = ManualSource::new();
        let session = session(Arc::clone(&source), Vec::new());
        session.start_camera().await.unwrap();
        source.push(0);
        wait_processed(&session, 1).await;

        session.stop_camera().await;
        assert!(source.push(1).is_none());
        assert!(session.request_capture().is_err());

        session.start_camera().await.unwrap();
        assert_eq!(source.push(2), Some(SubmitOutcome::Accepted { sequence: 1 }));
    }

    #[tokio::test]
    async fn gallery_is_newest_first() {
        let source = ManualSource::new();
        let session = session(Arc::clone(&source), Vec::new());
        session.set_viewport(Size::new(40.0, 20.0));
        session.start_camera().await.unwrap();

        let mut ids = Vec::new();
        for i in 0..2u64 {
            session.request_capture().unwrap();
            source.push(i);
            let capture = tokio::time::timeout(WAIT, session.next_capture())
                .await
                .unwrap()
                .unwrap();
            ids.push(capture.id);
            wait_processed(&session, i + 1).await;
        }
        let gallery: Vec<_> = session.gallery().iter().map(|c| c.id).collect();
        assert_eq!(gallery, vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn capture_uses_viewport_of_the_face_it_snapshots() {
        let source = ManualSource::new();
        let session = session(Arc::clone(&source), vec![centered_face()]);
        session.set_viewport(Size::new(40.0, 20.0));
        session
            .select_source_image(RgbaImage::from_pixel(100, 100, Rgba([200, 150, 120, 255])))
            .await
            .unwrap();
        session.start_camera().await.unwrap();
        source.push(0);
        wait_processed(&session, 1).await;

        // Resize after the face was drawn but before the shutter.
        session.set_viewport(Size::new(80.0, 40.0));
        let update = session.latest_update();
        assert_eq!(update.viewport, Size::new(40.0, 20.0));
        let ctx = session.capture_context(&update);
        assert_eq!(ctx.viewport(), Size::new(40.0, 20.0));

        session.request_capture().unwrap();
        source.push(1);
        let capture = tokio::time::timeout(WAIT, session.next_capture())
            .await
            .unwrap()
            .unwrap();
        // Face centre in buffer pixels is (20, 10); the overlay is opaque there.
        let centre = capture.image.get_pixel(20, 9);
        assert!(centre[3] > 200, "overlay missing at face centre: {:?}", centre);
        assert!(centre[0] >= 199, "expected source colour, got {:?}", centre);
    }
}
