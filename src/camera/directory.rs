/// Capture source that replays still images from a directory at a fixed
/// frame rate, in file-name order.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::camera::{CameraFacing, CaptureSource, FrameSink};
use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::pipeline::{Frame, SubmitOutcome};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct DirectorySource {
    dir: PathBuf,
    frame_interval: Duration,
    looping: bool,
    facing: Arc<Mutex<CameraFacing>>,
    stop_flag: Arc<AtomicBool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    finished_tx: Arc<watch::Sender<bool>>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, fps: u32, facing: CameraFacing) -> Self {
        let (finished_tx, _) = watch::channel(false);
        Self {
            dir: dir.into(),
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            looping: false,
            facing: Arc::new(Mutex::new(facing)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: tokio::sync::Mutex::new(None),
            finished_tx: Arc::new(finished_tx),
        }
    }

    /// Restart from the first frame after the last one instead of finishing.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Flips to `true` once every frame has been delivered or the source stopped.
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.finished_tx.subscribe()
    }

    pub fn list_frames(dir: &Path) -> FaceSwapResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn load_frames(paths: &[PathBuf]) -> FaceSwapResult<Vec<Arc<RgbaImage>>> {
        paths
            .iter()
            .map(|p| Ok(Arc::new(image::open(p)?.to_rgba8())))
            .collect()
    }
}

#[async_trait]
impl CaptureSource for DirectorySource {
    async fn start(&self, sink: FrameSink) -> FaceSwapResult<()> {
        self.stop().await;

        let paths = Self::list_frames(&self.dir)?;
        if paths.is_empty() {
            return Err(FaceSwapError::Camera(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }
        let frames = tokio::task::spawn_blocking(move || Self::load_frames(&paths))
            .await
            .map_err(|e| FaceSwapError::Camera(format!("join: {e}")))??;
        tracing::info!(dir = %self.dir.display(), frames = frames.len(), "replay source started");

        self.stop_flag.store(false, Ordering::SeqCst);
        self.finished_tx.send_replace(false);

        let stop_flag = Arc::clone(&self.stop_flag);
        let facing = Arc::clone(&self.facing);
        let finished_tx = Arc::clone(&self.finished_tx);
        let interval = self.frame_interval;
        let looping = self.looping;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut index: u64 = 0;
            loop {
                ticker.tick().await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                if !looping && index >= frames.len() as u64 {
                    break;
                }
                let slot = (index % frames.len() as u64) as usize;
                let current = *facing.lock().unwrap_or_else(PoisonError::into_inner);
                let outcome = sink.deliver(Frame::new(index, Arc::clone(&frames[slot]), current));
                if outcome == SubmitOutcome::Stopped {
                    tracing::debug!(index, "pipeline stopped; ending replay");
                    break;
                }
                tracing::trace!(index, ?outcome, "frame delivered");
                index += 1;
            }
            finished_tx.send_replace(true);
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            self.finished_tx.send_replace(true);
            tracing::info!(dir = %self.dir.display(), "replay source stopped");
        }
    }

    async fn switch_facing(&self) -> CameraFacing {
        let mut facing = self.facing.lock().unwrap_or_else(PoisonError::into_inner);
        let switched = facing.toggled();
        *facing = switched;
        tracing::info!(facing = ?switched, "camera switched");
        switched
    }

    fn facing(&self) -> CameraFacing {
        *self.facing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
