// THEORY:
// The `detector` module defines the contract every exercise family implements. A
// rep detector is a pure transform: it owns no state of its own, only a threshold
// profile. The caller owns a `State` value (created by `initial_state`) and hands it
// back in on every frame:
//
//     (frame, &mut state) -> Detection
//
// Keeping state outside the detector means a session can be reset, snapshotted or
// dropped by the lifecycle layer without the detector noticing.
//
// This module also holds the vocabulary shared by all detectors: limb `Phase`s, the
// per-frame `Detection` record, and the `Tracking` monitor that turns a run of
// missing poses into a grace-period reset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::core_modules::landmark::PoseFrame;

/// Discrete state of one limb's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Down,
    Up,
    Standing,
    Lunging,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Down => "down",
            Phase::Up => "up",
            Phase::Standing => "standing",
            Phase::Lunging => "lunging",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a limb's state machine did on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimbEvent {
    Idle,
    /// Entered the working phase (knee up, lunge down).
    Armed,
    /// Returned to neutral, closing one cycle.
    Completed,
}

/// How noteworthy a piece of feedback is. Continuous coaching is returned to push
/// callers on every frame; the rest is also worth announcing in blocking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Rep,
    Cue,
    Coaching,
    TrackingLost,
    TrackingReset,
}

impl FeedbackKind {
    pub fn is_announcement(&self) -> bool {
        !matches!(self, FeedbackKind::Coaching)
    }
}

/// The result of running a detector over one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Whether this frame produced a counted rep.
    pub rep_detected: bool,
    /// Reps counted so far by this detector state.
    pub rep_count: u32,
    /// Human-readable feedback for this frame.
    pub feedback: String,
    pub kind: FeedbackKind,
    /// Left limb phase after this frame.
    pub left: Phase,
    /// Right limb phase after this frame.
    pub right: Phase,
}

/// A rep-detection algorithm for one exercise family.
pub trait RepDetector {
    type State;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// A fresh state: neutral phases, zero reps, empty buffers.
    fn initial_state(&self) -> Self::State;

    /// Advances `state` by one frame. Never fails: detection-quality problems are
    /// reported through the feedback text.
    fn detect(&self, state: &mut Self::State, frame: &PoseFrame) -> Detection;

    /// Marks the start of a set at `now`: no rep is counted within the cooldown
    /// that follows.
    fn start_set(&self, state: &mut Self::State, now: Instant);

    fn rep_count(&self, state: &Self::State) -> u32;

    /// Current (left, right) phases.
    fn phases(&self, state: &Self::State) -> (Phase, Phase);
}

/// What the tracking monitor concluded about a frame without a usable pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropout {
    /// Within the grace period. `first` is set on the frame tracking was lost.
    Brief { first: bool },
    /// Past the grace period. `first` is set on the frame the grace period ran out.
    Expired { first: bool },
}

/// Follows pose visibility over time and decides when a dropout is long enough to
/// reset the limb phases.
#[derive(Debug, Clone)]
pub struct Tracking {
    grace_period: Duration,
    /// Last frame with a pose, or the first missing frame if none was ever seen.
    reference: Option<Instant>,
    missed_frames: u32,
    expired: bool,
}

impl Tracking {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            reference: None,
            missed_frames: 0,
            expired: false,
        }
    }

    pub fn observe_present(&mut self, now: Instant) {
        self.reference = Some(now);
        self.missed_frames = 0;
        self.expired = false;
    }

    pub fn observe_missing(&mut self, now: Instant) -> Dropout {
        let reference = *self.reference.get_or_insert(now);
        self.missed_frames += 1;

        if now.saturating_duration_since(reference) > self.grace_period {
            let first = !self.expired;
            self.expired = true;
            Dropout::Expired { first }
        } else {
            Dropout::Brief {
                first: self.missed_frames == 1,
            }
        }
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }
}

pub const STAY_IN_FRAME: &str = "No pose detected. Stay in frame.";
pub const MOVE_CLOSER: &str = "No pose detected. Move closer to the camera.";
pub const INCOMPLETE_POSE: &str = "Pose detection failed, adjust position.";

/// Builds the detection for a frame without a usable pose. `reset` is called when
/// the grace period has run out and must return the limbs to neutral.
pub fn dropout_detection(
    dropout: Dropout,
    incomplete: bool,
    rep_count: u32,
    reset: impl FnOnce() -> (Phase, Phase),
    phases: (Phase, Phase),
) -> Detection {
    let (feedback, kind, (left, right)) = match dropout {
        Dropout::Expired { first } => {
            let kind = if first {
                FeedbackKind::TrackingReset
            } else {
                FeedbackKind::Coaching
            };
            (MOVE_CLOSER, kind, reset())
        }
        Dropout::Brief { first } => {
            let message = if incomplete { INCOMPLETE_POSE } else { STAY_IN_FRAME };
            let kind = if first {
                FeedbackKind::TrackingLost
            } else {
                FeedbackKind::Coaching
            };
            (message, kind, phases)
        }
    };

    Detection {
        rep_detected: false,
        rep_count,
        feedback: feedback.to_string(),
        kind,
        left,
        right,
    }
}
