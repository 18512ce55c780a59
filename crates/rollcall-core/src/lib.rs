//! rollcall-core: Face matching engine for attendance.
//!
//! Uses SCRFD for face detection, ArcFace for embeddings and the MediaPipe
//! face mesh for eyelid landmarks, all running via ONNX Runtime on CPU.

pub mod alignment;
pub mod detector;
pub mod gallery;
pub mod landmarks;
pub mod liveness;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use gallery::Gallery;
pub use landmarks::{EyeLids, FaceMesh};
pub use liveness::{GateStatus, LivenessGate, RecognitionOutcome};
pub use pipeline::{Identify, ModelPaths, PipelineError, ReferenceMatcher};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Candidate, Embedding, Identification, Threshold};

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
