use std::path::PathBuf;

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Socket address to listen on (default: 0.0.0.0:8000).
    pub bind: String,
    /// Reference photo directory.
    pub images_dir: PathBuf,
    /// Attendance CSV file.
    pub ledger_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine distance below which a match is accepted.
    pub distance_threshold: f32,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        Self {
            bind: std::env::var("ROLLCALL_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            images_dir: env_path("ROLLCALL_IMAGES_DIR", "images"),
            ledger_path: env_path("ROLLCALL_LEDGER_PATH", "attendance.csv"),
            model_dir,
            distance_threshold: env_f32("ROLLCALL_DISTANCE_THRESHOLD", 0.50),
            max_upload_bytes: env_usize("ROLLCALL_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
