use rollcall_core::liveness::DEFAULT_BLINK_THRESHOLD;
use std::path::PathBuf;

/// Kiosk configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may pick another.
    pub capture_width: u32,
    pub capture_height: u32,
    pub images_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub model_dir: PathBuf,
    /// Cosine distance below which a match is accepted. Stricter than the
    /// service since the kiosk writes attendance unattended.
    pub distance_threshold: f32,
    /// Lid gap, as a fraction of frame height, below which the eye is closed.
    pub blink_threshold: f32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            capture_width: env_u32("ROLLCALL_CAPTURE_WIDTH", 640),
            capture_height: env_u32("ROLLCALL_CAPTURE_HEIGHT", 480),
            images_dir: env_path("ROLLCALL_IMAGES_DIR", "images"),
            ledger_path: env_path("ROLLCALL_LEDGER_PATH", "attendance.csv"),
            model_dir,
            distance_threshold: env_f32("ROLLCALL_DISTANCE_THRESHOLD", 0.35),
            blink_threshold: env_f32("ROLLCALL_BLINK_THRESHOLD", DEFAULT_BLINK_THRESHOLD),
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

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
