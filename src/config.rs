use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{FaceSwapError, FaceSwapResult};
use crate::geometry::ExpansionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub source_face: SourceFaceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the overlay is sized and placed relative to the detected face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Overlay width as a multiple of the detected face width.
    #[serde(default = "default_expansion_factor")]
    pub expansion_factor: f64,
    /// Upward shift of the overlay centre, as a fraction of face height.
    #[serde(default = "default_vertical_nudge")]
    pub vertical_nudge: f64,
    /// Opacity of the on-screen overlay. Captures are composited opaque.
    #[serde(default = "default_overlay_opacity")]
    pub overlay_opacity: f64,
}

impl GeometryConfig {
    pub fn expansion_policy(&self) -> ExpansionPolicy {
        ExpansionPolicy {
            width_factor: self.expansion_factor,
            vertical_nudge: self.vertical_nudge,
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            expansion_factor: default_expansion_factor(),
            vertical_nudge: default_vertical_nudge(),
            overlay_opacity: default_overlay_opacity(),
        }
    }
}

fn default_expansion_factor() -> f64 {
    1.8
}

fn default_vertical_nudge() -> f64 {
    0.03
}

fn default_overlay_opacity() -> f64 {
    0.88
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Live-frame faces below this confidence are treated as "no face".
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.45
}

/// Crop and feather parameters for preparing the overlay from a still image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFaceConfig {
    #[serde(default = "default_padding_x")]
    pub padding_x: f64,
    #[serde(default = "default_padding_y")]
    pub padding_y: f64,
    /// Radius (fraction of the crop's shorter side) inside which the mask is opaque.
    #[serde(default = "default_mask_inner")]
    pub mask_inner: f64,
    /// Radius (fraction of the crop's longer side) beyond which the mask is transparent.
    #[serde(default = "default_mask_outer")]
    pub mask_outer: f64,
}

impl Default for SourceFaceConfig {
    fn default() -> Self {
        Self {
            padding_x: default_padding_x(),
            padding_y: default_padding_y(),
            mask_inner: default_mask_inner(),
            mask_outer: default_mask_outer(),
        }
    }
}

fn default_padding_x() -> f64 {
    0.35
}

fn default_padding_y() -> f64 {
    0.5
}

fn default_mask_inner() -> f64 {
    0.35
}

fn default_mask_outer() -> f64 {
    0.55
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Buffer of composed captures waiting for the render side.
    #[serde(default = "default_capture_buffer")]
    pub capture_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_buffer: default_capture_buffer(),
        }
    }
}

fn default_capture_buffer() -> usize {
    8
}

/// Inputs for the replay binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,
    /// JSON file of face observations, see `detection::ReplayDetector`.
    #[serde(default = "default_detections_file")]
    pub detections_file: String,
    pub source_face: Option<String>,
    #[serde(default)]
    pub source_face_detections: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_viewport")]
    pub viewport: [f64; 2],
    #[serde(default = "default_true")]
    pub front_camera: bool,
    /// Frame indices at which a capture is requested.
    #[serde(default)]
    pub capture_at: Vec<u64>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frames_dir: default_frames_dir(),
            detections_file: default_detections_file(),
            source_face: None,
            source_face_detections: None,
            output_dir: default_output_dir(),
            fps: default_fps(),
            viewport: default_viewport(),
            front_camera: true,
            capture_at: Vec::new(),
        }
    }
}

fn default_frames_dir() -> String {
    "frames".into()
}

fn default_detections_file() -> String {
    "detections.json".into()
}

fn default_output_dir() -> String {
    "captures".into()
}

fn default_fps() -> u32 {
    30
}

fn default_viewport() -> [f64; 2] {
    [390.0, 844.0]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

fn resolve_config_path() -> FaceSwapResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("faceswap-live").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(FaceSwapError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn parse_config(content: &str) -> FaceSwapResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.geometry.expansion_factor <= 0.0 {
        return Err(FaceSwapError::Config(
            "geometry.expansion_factor must be > 0".into(),
        ));
    }
    if config.source_face.mask_outer <= 0.0 {
        return Err(FaceSwapError::Config("source_face.mask_outer must be > 0".into()));
    }
    Ok(config)
}

pub fn load_config() -> FaceSwapResult<AppConfig> {
    load_config_from(&resolve_config_path()?)
}

pub fn load_config_from(path: &Path) -> FaceSwapResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        threshold = config.detection.confidence_threshold,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> FaceSwapResult<()> {
    save_config_to(config, &resolve_config_path()?)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> FaceSwapResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
