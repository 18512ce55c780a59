//! Live webcam attendance with a blink liveness check.

use crate::config::Config;
use crate::overlay::{Screen, StatusLine};
use crate::worker::RecognitionWorker;
use anyhow::{Context, Result};
use image::GrayImage;
use rollcall_core::gallery;
use rollcall_core::{
    EyeLids, FaceDetector, FaceMesh, LivenessGate, ModelPaths, ReferenceMatcher, Threshold,
};
use rollcall_hw::Camera;
use rollcall_ledger::Ledger;

const WINDOW_TITLE: &str = "Anti-Spoofing Attendance System";

/// Face tracking on the render thread; only feeds the liveness gate.
struct EyeTracker {
    detector: FaceDetector,
    mesh: FaceMesh,
}

impl EyeTracker {
    fn lids(&mut self, frame: &GrayImage) -> Result<Option<EyeLids>> {
        let faces = self.detector.detect(frame)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        Ok(Some(self.mesh.eye_lids(frame, face)?))
    }
}

/// Feed one frame's eyelids to the gate. Returns `true` if a blink was counted.
fn observe_eyes(
    gate: &mut LivenessGate,
    is_dark: bool,
    frame_height: u32,
    lids: impl FnOnce() -> Result<Option<EyeLids>>,
) -> bool {
    if is_dark {
        gate.lose_eyes();
        return false;
    }
    match lids() {
        Ok(Some(lids)) => gate.observe_eyes(lids.openness(frame_height)),
        Ok(None) => {
            gate.lose_eyes();
            false
        }
        Err(e) => {
            tracing::debug!(error = %e, "eye tracking failed");
            false
        }
    }
}

pub fn run(config: &Config) -> Result<()> {
    if gallery::ensure_dir(&config.images_dir)? {
        tracing::warn!(path = %config.images_dir.display(), "created missing reference directory");
    }
    let ledger = Ledger::open(&config.ledger_path)?;

    let models = ModelPaths::in_dir(&config.model_dir);
    let mut tracker = EyeTracker {
        detector: FaceDetector::load(&models.detector)?,
        mesh: FaceMesh::load(&models.face_mesh)?,
    };
    let matcher = ReferenceMatcher::load(&models, &config.images_dir)?;
    let worker = RecognitionWorker::spawn(Box::new(matcher), Threshold(config.distance_threshold))
        .context("failed to start recognition worker")?;

    let camera = Camera::open(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
    )
    .with_context(|| format!("cannot open camera {}", config.camera_device))?;
    let mut stream = camera.stream()?;

    let mut gate = LivenessGate::new(config.blink_threshold);
    let mut screen = Screen::enter(WINDOW_TITLE)?;

    loop {
        if screen.quit_requested()? {
            break;
        }

        let frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "camera stopped delivering frames");
                break;
            }
        };
        let image = frame.to_image()?;

        let blinked = observe_eyes(&mut gate, frame.is_dark, image.height(), || {
            tracker.lids(&image)
        });

        // Dark frames (lens covered, lights off) are not worth a match.
        if frame.is_dark {
            tracing::trace!(seq = frame.sequence, "dark frame");
        } else {
            worker.try_submit(&image);
        }
        while let Some(outcome) = worker.poll() {
            gate.record_recognition(outcome);
        }

        if let Some(name) = gate.take_acceptance() {
            match ledger.record_now(&name) {
                Ok(true) => tracing::info!(user = %name, "attendance logged"),
                Ok(false) => tracing::debug!(user = %name, "already present today"),
                Err(e) => tracing::error!(error = %e, user = %name, "failed to write attendance"),
            }
        }

        screen.draw(&StatusLine::new(&gate.status(), blinked))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEIGHT: u32 = 480;

    fn lids(gap: f32) -> EyeLids {
        EyeLids {
            upper: (100.0, 200.0),
            lower: (100.0, 200.0 + gap),
        }
    }

    #[test]
    fn test_closed_eye_on_bright_frame_is_a_blink() {
        let mut gate = LivenessGate::default();
        assert!(!observe_eyes(&mut gate, false, HEIGHT, || Ok(Some(lids(12.0)))));
        assert!(observe_eyes(&mut gate, false, HEIGHT, || Ok(Some(lids(1.0)))));
        assert_eq!(gate.blink_count(), 1);
    }

    #[test]
    fn test_dark_frame_skips_eye_tracking() {
        let mut gate = LivenessGate::default();
        let mut tracked = false;
        let blinked = observe_eyes(&mut gate, true, HEIGHT, || {
            tracked = true;
            Ok(Some(lids(0.0)))
        });
        assert!(!blinked);
        assert!(!tracked);
        assert_eq!(gate.blink_count(), 0);
    }

    #[test]
    fn test_tracking_error_counts_nothing() {
        let mut gate = LivenessGate::default();
        assert!(!observe_eyes(&mut gate, false, HEIGHT, || Err(anyhow::anyhow!("mesh failed"))));
        assert_eq!(gate.blink_count(), 0);
    }
}
