use chrono::NaiveDate;
use rollcall_core::{Identification, Identify, PipelineError, Threshold};
use rollcall_ledger::{Entry, Ledger, LedgerError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of verifying one uploaded image.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Accepted match; attendance has been recorded for today.
    Present {
        user: String,
        confidence: f32,
        /// `false` if the person was already logged today.
        newly_logged: bool,
    },
    /// No face, or the closest reference was not close enough.
    Unknown,
    /// There is nothing to match against.
    NoReferences,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Verify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Verdict, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<usize>,
    },
    Attendance {
        date: NaiveDate,
        reply: oneshot::Sender<Result<Vec<Entry>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Match an encoded image and record attendance on acceptance.
    pub async fn verify(&self, image: Vec<u8>) -> Result<Verdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Number of embedded reference faces.
    pub async fn reference_count(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Ledger rows for `date`.
    pub async fn attendance(&self, date: NaiveDate) -> Result<Vec<Entry>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Attendance {
                date,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the matcher and the ledger, so requests are handled one
/// at a time and the ledger's read-check-append never interleaves.
pub fn spawn_engine(
    mut matcher: Box<dyn Identify>,
    ledger: Ledger,
    threshold: Threshold,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(threshold = threshold.0, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { image, reply } => {
                        let result = run_verify(matcher.as_mut(), &ledger, threshold, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(matcher.reference_count());
                    }
                    EngineRequest::Attendance { date, reply } => {
                        let _ = reply.send(ledger.entries_on(date).map_err(EngineError::from));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_verify(
    matcher: &mut dyn Identify,
    ledger: &Ledger,
    threshold: Threshold,
    image: &[u8],
) -> Result<Verdict, EngineError> {
    let frame = image::load_from_memory(image)?.to_luma8();

    let candidate = match matcher.identify(&frame)? {
        Identification::EmptyReferences => return Ok(Verdict::NoReferences),
        Identification::NoFace => {
            tracing::debug!("verify: no face in upload");
            return Ok(Verdict::Unknown);
        }
        Identification::Closest(candidate) => candidate,
    };

    tracing::info!(
        user = %candidate.identity,
        distance = candidate.distance,
        "verify: analyzed upload"
    );

    if !threshold.accepts(candidate.distance) {
        return Ok(Verdict::Unknown);
    }

    let newly_logged = ledger.record_now(&candidate.identity)?;
    Ok(Verdict::Present {
        confidence: candidate.confidence(),
        user: candidate.identity,
        newly_logged,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::{png_bytes, StubMatcher};
    use super::*;

    fn temp_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("attendance.csv")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_accepted_match_is_logged_once() {
        let (_dir, ledger) = temp_ledger();
        let mut matcher = StubMatcher::closest("KATRINA", 0.13);

        let first = run_verify(&mut matcher, &ledger, Threshold(0.5), &png_bytes()).unwrap();
        assert_eq!(
            first,
            Verdict::Present {
                user: "KATRINA".into(),
                confidence: 0.87,
                newly_logged: true,
            }
        );

        let second = run_verify(&mut matcher, &ledger, Threshold(0.5), &png_bytes()).unwrap();
        assert!(matches!(second, Verdict::Present { newly_logged: false, .. }));
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_distance_at_threshold_is_unknown() {
        let (_dir, ledger) = temp_ledger();
        let mut matcher = StubMatcher::closest("KATRINA", 0.5);

        let verdict = run_verify(&mut matcher, &ledger, Threshold(0.5), &png_bytes()).unwrap();
        assert_eq!(verdict, Verdict::Unknown);
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn test_empty_references_and_no_face() {
        let (_dir, ledger) = temp_ledger();

        let mut empty = StubMatcher {
            result: Identification::EmptyReferences,
        };
        let verdict = run_verify(&mut empty, &ledger, Threshold(0.5), &png_bytes()).unwrap();
        assert_eq!(verdict, Verdict::NoReferences);

        let mut no_face = StubMatcher {
            result: Identification::NoFace,
        };
        let verdict = run_verify(&mut no_face, &ledger, Threshold(0.5), &png_bytes()).unwrap();
        assert_eq!(verdict, Verdict::Unknown);
    }

    #[test]
    fn test_undecodable_upload() {
        let (_dir, ledger) = temp_ledger();
        let mut matcher = StubMatcher::closest("KATRINA", 0.1);
        let err = run_verify(&mut matcher, &ledger, Threshold(0.5), b"not an image").unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (_dir, ledger) = temp_ledger();
        let engine = spawn_engine(
            Box::new(StubMatcher::closest("AMIR", 0.2)),
            ledger,
            Threshold(0.5),
        );

        assert_eq!(engine.reference_count().await.unwrap(), 1);
        let verdict = engine.verify(png_bytes()).await.unwrap();
        assert!(matches!(verdict, Verdict::Present { ref user, .. } if user == "AMIR"));

        let today = engine.attendance(rollcall_ledger::today()).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].name, "AMIR");
    }
}
