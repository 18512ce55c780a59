//! Blink-gated liveness for the webcam kiosk.
//!
//! A printed photo or a still on a phone screen can be recognised just as
//! well as a live face. The gate therefore accepts a recognised identity only
//! after an eye closure has been observed for that identity.
//!
//! Two inputs drive the gate, at different rates:
//!
//! - every rendered frame reports the left-eye lid gap
//!   ([`LivenessGate::observe_eyes`]), normalised by frame height;
//! - the background recognition worker reports match outcomes whenever a job
//!   finishes ([`LivenessGate::record_recognition`]).
//!
//! A blink is the transition from open to closed, so holding the eye shut
//! counts once. The blink counter re-arms whenever the verified identity
//! changes or verification is lost.
//!
//! # Threat Coverage
//!
//! - **Blocks:** static printed photographs, still images on a screen.
//! - **Does not block:** video replay of a blinking subject, masks with
//!   cut-out eyes.

/// Lid gap (fraction of frame height) below which the eye counts as closed.
pub const DEFAULT_BLINK_THRESHOLD: f32 = 0.012;

/// Label shown before any recognition result arrives.
pub const SCANNING_LABEL: &str = "Scanning...";

/// Label shown when a face was matched to nobody.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Result of one background recognition job.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    /// Closest reference was within the threshold.
    Match(String),
    /// A face was found but no reference was close enough.
    Unknown,
    /// No face, or no references to compare against.
    NoFace,
    /// The job failed; the previous state is kept.
    Failed,
}

/// What the kiosk should display.
#[derive(Debug, Clone, PartialEq)]
pub enum GateStatus {
    Verified(String),
    BlinkNeeded(String),
    Scanning(String),
}

/// Per-session liveness state.
#[derive(Debug, Clone)]
pub struct LivenessGate {
    blink_threshold: f32,
    blink_count: u32,
    eye_closed: bool,
    verified: bool,
    current_user: String,
    /// Acceptance for the current arming has already been handed out.
    accepted: bool,
}

impl Default for LivenessGate {
    fn default() -> Self {
        Self::new(DEFAULT_BLINK_THRESHOLD)
    }
}

impl LivenessGate {
    pub fn new(blink_threshold: f32) -> Self {
        Self {
            blink_threshold,
            blink_count: 0,
            eye_closed: false,
            verified: false,
            current_user: SCANNING_LABEL.to_string(),
            accepted: false,
        }
    }

    /// Feed the lid gap from one frame. Returns `true` if a blink was counted.
    pub fn observe_eyes(&mut self, openness: f32) -> bool {
        let closed = openness < self.blink_threshold;
        let blinked = closed && !self.eye_closed;
        self.eye_closed = closed;
        if blinked {
            self.blink_count += 1;
            tracing::debug!(blinks = self.blink_count, openness, "blink detected");
        }
        blinked
    }

    /// The face left the frame; the next closure starts a fresh blink.
    pub fn lose_eyes(&mut self) {
        self.eye_closed = false;
    }

    pub fn record_recognition(&mut self, outcome: RecognitionOutcome) {
        match outcome {
            RecognitionOutcome::Match(name) => {
                if !self.verified || self.current_user != name {
                    self.rearm();
                }
                self.verified = true;
                self.current_user = name;
            }
            RecognitionOutcome::Unknown => {
                self.unverify();
                self.current_user = UNKNOWN_LABEL.to_string();
            }
            RecognitionOutcome::NoFace => self.unverify(),
            RecognitionOutcome::Failed => {}
        }
    }

    pub fn status(&self) -> GateStatus {
        match (self.verified, self.blink_count > 0) {
            (true, true) => GateStatus::Verified(self.current_user.clone()),
            (true, false) => GateStatus::BlinkNeeded(self.current_user.clone()),
            (false, _) => GateStatus::Scanning(self.current_user.clone()),
        }
    }

    /// Yield the verified identity once per arming, for the attendance write.
    pub fn take_acceptance(&mut self) -> Option<String> {
        if self.verified && self.blink_count > 0 && !self.accepted {
            self.accepted = true;
            Some(self.current_user.clone())
        } else {
            None
        }
    }

    pub fn blink_count(&self) -> u32 {
        self.blink_count
    }

    fn unverify(&mut self) {
        if self.verified {
            self.rearm();
        }
        self.verified = false;
    }

    fn rearm(&mut self) {
        self.blink_count = 0;
        self.accepted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: f32 = 0.03;
    const CLOSED: f32 = 0.005;

    fn blink(gate: &mut LivenessGate) -> bool {
        let counted = gate.observe_eyes(CLOSED);
        gate.observe_eyes(OPEN);
        counted
    }

    #[test]
    fn test_initial_status_is_scanning() {
        let gate = LivenessGate::default();
        assert_eq!(gate.status(), GateStatus::Scanning(SCANNING_LABEL.into()));
        assert_eq!(gate.blink_count(), 0);
    }

    #[test]
    fn test_match_without_blink_is_not_accepted() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        assert_eq!(gate.status(), GateStatus::BlinkNeeded("KATRINA".into()));
        assert_eq!(gate.take_acceptance(), None);
    }

    #[test]
    fn test_match_then_blink_is_accepted_once() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        assert!(blink(&mut gate));
        assert_eq!(gate.status(), GateStatus::Verified("KATRINA".into()));
        assert_eq!(gate.take_acceptance(), Some("KATRINA".into()));
        assert_eq!(gate.take_acceptance(), None);

        // Same identity confirmed again: still verified, no second acceptance.
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        assert_eq!(gate.status(), GateStatus::Verified("KATRINA".into()));
        assert_eq!(gate.take_acceptance(), None);
    }

    #[test]
    fn test_held_closed_eye_counts_once() {
        let mut gate = LivenessGate::default();
        assert!(gate.observe_eyes(CLOSED));
        assert!(!gate.observe_eyes(CLOSED));
        assert!(!gate.observe_eyes(CLOSED));
        assert_eq!(gate.blink_count(), 1);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut gate = LivenessGate::new(0.012);
        assert!(!gate.observe_eyes(0.012));
        assert!(gate.observe_eyes(0.0119));
    }

    #[test]
    fn test_identity_change_rearms() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        blink(&mut gate);
        assert_eq!(gate.take_acceptance(), Some("KATRINA".into()));

        gate.record_recognition(RecognitionOutcome::Match("AMIR".into()));
        assert_eq!(gate.status(), GateStatus::BlinkNeeded("AMIR".into()));
        assert_eq!(gate.take_acceptance(), None);

        blink(&mut gate);
        assert_eq!(gate.take_acceptance(), Some("AMIR".into()));
    }

    #[test]
    fn test_blink_before_match_does_not_carry_over() {
        let mut gate = LivenessGate::default();
        blink(&mut gate);
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        assert_eq!(gate.status(), GateStatus::BlinkNeeded("KATRINA".into()));
    }

    #[test]
    fn test_unknown_clears_verification() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        blink(&mut gate);
        gate.record_recognition(RecognitionOutcome::Unknown);
        assert_eq!(gate.status(), GateStatus::Scanning(UNKNOWN_LABEL.into()));
        assert_eq!(gate.blink_count(), 0);
    }

    #[test]
    fn test_no_face_keeps_label() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        gate.record_recognition(RecognitionOutcome::NoFace);
        assert_eq!(gate.status(), GateStatus::Scanning("KATRINA".into()));
    }

    #[test]
    fn test_failed_job_keeps_state() {
        let mut gate = LivenessGate::default();
        gate.record_recognition(RecognitionOutcome::Match("KATRINA".into()));
        blink(&mut gate);
        gate.record_recognition(RecognitionOutcome::Failed);
        assert_eq!(gate.status(), GateStatus::Verified("KATRINA".into()));
    }

    #[test]
    fn test_lose_eyes_allows_fresh_blink() {
        let mut gate = LivenessGate::default();
        assert!(gate.observe_eyes(CLOSED));
        gate.lose_eyes();
        assert!(gate.observe_eyes(CLOSED));
        assert_eq!(gate.blink_count(), 2);
    }
}
