pub mod camera;
pub mod compositor;
pub mod config;
pub mod detection;
pub mod errors;
pub mod geometry;
pub mod pipeline;
pub mod session;

pub use errors::{FaceSwapError, FaceSwapResult};
pub use session::LiveSwapSession;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}
