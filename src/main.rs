//! Replays a directory of frames through the live pipeline with recorded
//! detections and writes the composed captures as PNG files.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use faceswap_live::camera::{CameraFacing, DirectorySource};
use faceswap_live::config::{self, AppConfig};
use faceswap_live::detection::{FaceDetector, ReplayDetector};
use faceswap_live::geometry::Size;
use faceswap_live::{FaceSwapError, FaceSwapResult, LiveSwapSession};

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let (config, config_error) = match config::load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    faceswap_live::init_tracing(&config.logging.filter);
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Failed to load config; using defaults");
    }

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "replay failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> FaceSwapResult<()> {
    let replay = config.replay.clone();
    let output_dir = PathBuf::from(&replay.output_dir);

    let detector: Arc<dyn FaceDetector> = Arc::new(ReplayDetector::load(Path::new(&replay.detections_file))?);
    let source = Arc::new(DirectorySource::new(
        &replay.frames_dir,
        replay.fps,
        CameraFacing::from_front(replay.front_camera),
    ));
    let mut finished = source.finished();

    let mut session = LiveSwapSession::new(config, detector, source.clone());
    if let Some(path) = &replay.source_face_detections {
        session = session.with_still_detector(Arc::new(ReplayDetector::load(Path::new(path))?));
    }
    session.set_viewport(Size::new(replay.viewport[0], replay.viewport[1]));

    if let Some(path) = &replay.source_face {
        let image = image::open(path)?.to_rgba8();
        match session.select_source_image(image).await {
            Ok(()) => tracing::info!(path = %path, "source face selected"),
            Err(FaceSwapError::NoFaceFound) => {
                tracing::warn!(path = %path, "no face in source image; captures will be plain frames")
            }
            Err(e) => return Err(e),
        }
    }

    session.start_camera().await?;
    let mut updates = session.subscribe_updates()?;
    let mut capture_at: BTreeSet<u64> = replay.capture_at.iter().copied().collect();
    let mut saved = 0usize;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = updates.borrow_and_update().clone();
                if let Some(placement) = session.overlay_placement() {
                    tracing::debug!(
                        frame = update.frame_index,
                        x = placement.center.x,
                        y = placement.center.y,
                        width = placement.width,
                        height = placement.height,
                        "overlay placed"
                    );
                }
                if capture_at.first().is_some_and(|next| update.frame_index >= *next) {
                    capture_at.pop_first();
                    session.request_capture()?;
                }
            }
            capture = session.next_capture() => {
                let Some(capture) = capture else { break };
                capture.save_png(&output_dir)?;
                saved += 1;
            }
            _ = finished.wait_for(|done| *done) => break,
        }
    }

    // Let a frame that is still compositing finish before shutting down.
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while session.is_processing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    session.stop_camera().await;

    for capture in session.drain_captures() {
        capture.save_png(&output_dir)?;
        saved += 1;
    }
    if !capture_at.is_empty() {
        tracing::warn!(missed = ?capture_at, "capture frames never reached");
    }

    let stats = session.stats();
    tracing::info!(saved, stats = %serde_json::to_string(&stats)?, "replay finished");
    Ok(())
}
