//! Background recognition worker for the kiosk.
//!
//! The render loop hands a frame over only while the worker is idle, so at
//! most one identification is in flight and frames are never queued up
//! behind a slow match.

use image::GrayImage;
use rollcall_core::{Identification, Identify, PipelineError, RecognitionOutcome, Threshold};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

pub struct RecognitionWorker {
    busy: Arc<AtomicBool>,
    jobs: mpsc::SyncSender<GrayImage>,
    results: mpsc::Receiver<RecognitionOutcome>,
}

impl RecognitionWorker {
    /// Start the worker thread. It exits once the worker is dropped.
    pub fn spawn(mut matcher: Box<dyn Identify>, threshold: Threshold) -> std::io::Result<Self> {
        let busy = Arc::new(AtomicBool::new(false));
        let (jobs, job_rx) = mpsc::sync_channel::<GrayImage>(1);
        let (result_tx, results) = mpsc::channel();

        let flag = Arc::clone(&busy);
        std::thread::Builder::new()
            .name("rollcall-recognition".into())
            .spawn(move || {
                tracing::info!(threshold = threshold.0, "recognition worker started");
                for frame in job_rx {
                    let outcome = classify(matcher.identify(&frame), threshold);
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                    flag.store(false, Ordering::Release);
                }
                tracing::info!("recognition worker exiting");
            })?;

        Ok(Self {
            busy,
            jobs,
            results,
        })
    }

    /// Hand `frame` to the worker if it is idle. Returns `false` if a job is
    /// already running.
    pub fn try_submit(&self, frame: &GrayImage) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if self.jobs.try_send(frame.clone()).is_err() {
            self.busy.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Next finished outcome, without blocking.
    pub fn poll(&self) -> Option<RecognitionOutcome> {
        self.results.try_recv().ok()
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Map one identification onto the liveness gate's vocabulary.
pub fn classify(
    result: Result<Identification, PipelineError>,
    threshold: Threshold,
) -> RecognitionOutcome {
    match result {
        Ok(Identification::Closest(candidate)) => {
            tracing::debug!(
                user = %candidate.identity,
                distance = candidate.distance,
                "closest reference"
            );
            if threshold.accepts(candidate.distance) {
                RecognitionOutcome::Match(candidate.identity)
            } else {
                RecognitionOutcome::Unknown
            }
        }
        Ok(Identification::NoFace) => RecognitionOutcome::NoFace,
        Ok(Identification::EmptyReferences) => {
            tracing::warn!("no reference photos to match against");
            RecognitionOutcome::NoFace
        }
        Err(e) => {
            tracing::warn!(error = %e, "recognition failed");
            RecognitionOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::Candidate;
    use std::path::PathBuf;
    use std::time::Duration;

    fn closest(identity: &str, distance: f32) -> Identification {
        Identification::Closest(Candidate {
            identity: identity.to_string(),
            reference: PathBuf::from("images/x.jpg"),
            distance,
        })
    }

    /// Blocks each identification until the test releases it.
    struct GatedMatcher {
        gate: mpsc::Receiver<()>,
        result: Identification,
    }

    impl Identify for GatedMatcher {
        fn identify(&mut self, _frame: &GrayImage) -> Result<Identification, PipelineError> {
            let _ = self.gate.recv();
            Ok(self.result.clone())
        }

        fn reference_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_classify_threshold_is_strict() {
        let t = Threshold(0.35);
        assert_eq!(
            classify(Ok(closest("KATRINA", 0.2)), t),
            RecognitionOutcome::Match("KATRINA".into())
        );
        assert_eq!(classify(Ok(closest("KATRINA", 0.35)), t), RecognitionOutcome::Unknown);
    }

    #[test]
    fn test_classify_no_match_cases() {
        let t = Threshold(0.35);
        assert_eq!(classify(Ok(Identification::NoFace), t), RecognitionOutcome::NoFace);
        assert_eq!(
            classify(Ok(Identification::EmptyReferences), t),
            RecognitionOutcome::NoFace
        );
    }

    #[test]
    fn test_only_one_job_in_flight() {
        let (release, gate) = mpsc::channel();
        let worker = RecognitionWorker::spawn(
            Box::new(GatedMatcher {
                gate,
                result: closest("AMIR", 0.1),
            }),
            Threshold(0.35),
        )
        .unwrap();
        let frame = GrayImage::new(4, 4);

        assert!(worker.try_submit(&frame));
        assert!(worker.is_busy());
        assert!(!worker.try_submit(&frame));
        assert_eq!(worker.poll(), None);

        release.send(()).unwrap();
        let outcome = worker.results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, RecognitionOutcome::Match("AMIR".into()));

        // The busy flag is cleared right after the result is sent.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while worker.is_busy() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(worker.try_submit(&frame));
        release.send(()).unwrap();
    }
}
