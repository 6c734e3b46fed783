use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceSwapError {
    #[error("Degenerate geometry: content {content_w}x{content_h}, container {container_w}x{container_h}")]
    DegenerateGeometry {
        content_w: f64,
        content_h: f64,
        container_w: f64,
        container_h: f64,
    },

    #[error("No face found")]
    NoFaceFound,

    #[error("Compositing error: {0}")]
    Compositing(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Pipeline cancelled")]
    Cancelled,
}

impl serde::Serialize for FaceSwapError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type FaceSwapResult<T> = Result<T, FaceSwapError>;
