// THEORY:
// The `HighKneeDetector` counts bilateral knee lifts. Each leg runs its own
// down/up state machine; both legs feed one shared `RepCounter`.
//
// Per leg, per frame:
// 1.  The knee position is smoothed, then two measurements are taken: the lift
//     height (hip y minus knee y, positive when the knee rises above the hip line)
//     and the hip–knee–ankle angle at the smoothed knee.
// 2.  down -> up when the lift height clears `lift_height` and, if the profile sets
//     one, the angle exceeds `up_angle`.
// 3.  up -> down when every release condition the profile sets holds: angle below
//     `down_angle`, height below `drop_height`. This closes one cycle.
//
// After both legs have advanced, the counter settles the frame: at most one rep,
// and only outside the cooldown window.
//
// Two named profiles exist because the camera loop and the live frame-push path
// were tuned independently: the camera profile gates on angle and absolute height,
// the live profile on signed height alone with a tighter cooldown.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::seconds;
use crate::core_modules::detector::{
    dropout_detection, Detection, FeedbackKind, LimbEvent, Phase, RepDetector, Tracking,
};
use crate::core_modules::geometry::geometry::{joint_angle, Degrees};
use crate::core_modules::landmark::{Landmarks, Leg, Point, PoseFrame};
use crate::core_modules::rep_counter::RepCounter;
use crate::core_modules::smoothing::{SmoothingBuffer, SmoothingMode, DEFAULT_SMOOTHING_WINDOW};
use crate::error::{RepVisionError, Result};

/// Thresholds for the high-knee state machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighKneeProfile {
    /// Minimum lift height (normalized units) for a knee to count as raised.
    pub lift_height: f64,
    /// Measure the lift as |hip y - knee y| instead of the signed difference.
    pub absolute_height: bool,
    /// If set, the knee angle must also exceed this to arm the up phase.
    pub up_angle: Option<Degrees>,
    /// If set, the knee angle must fall below this to release.
    pub down_angle: Option<Degrees>,
    /// If set, the lift height must fall below this to release.
    pub drop_height: Option<f64>,
    pub cooldown_seconds: f64,
    pub grace_period_seconds: f64,
    pub smoothing_window: usize,
    pub smoothing: SmoothingMode,
}

impl Default for HighKneeProfile {
    fn default() -> Self {
        Self::live()
    }
}

impl HighKneeProfile {
    /// Angle-and-height thresholds used by the blocking camera loop.
    pub fn camera() -> Self {
        Self {
            lift_height: 0.04,
            absolute_height: true,
            up_angle: Some(90.0),
            down_angle: Some(30.0),
            drop_height: None,
            cooldown_seconds: 0.5,
            grace_period_seconds: 3.0,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing: SmoothingMode::Mean,
        }
    }

    /// Height-only thresholds used by the live frame-push path.
    pub fn live() -> Self {
        Self {
            lift_height: 0.02,
            absolute_height: false,
            up_angle: None,
            down_angle: None,
            drop_height: Some(0.01),
            cooldown_seconds: 0.3,
            grace_period_seconds: 3.0,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing: SmoothingMode::RecencyWeighted,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lift_height.is_finite() {
            return Err(RepVisionError::config("high-knee lift_height must be finite"));
        }
        if self.down_angle.is_none() && self.drop_height.is_none() {
            return Err(RepVisionError::config(
                "high-knee profile needs a down_angle or a drop_height to release a rep",
            ));
        }
        if let (Some(up), Some(down)) = (self.up_angle, self.down_angle) {
            if down >= up {
                return Err(RepVisionError::config(format!(
                    "high-knee down_angle ({down}) must be below up_angle ({up})"
                )));
            }
        }
        if let Some(drop) = self.drop_height {
            if drop > self.lift_height {
                return Err(RepVisionError::config(format!(
                    "high-knee drop_height ({drop}) must not exceed lift_height ({})",
                    self.lift_height
                )));
            }
        }
        self.cooldown()?;
        self.grace_period()?;
        Ok(())
    }

    pub fn cooldown(&self) -> Result<Duration> {
        seconds("cooldown_seconds", self.cooldown_seconds)
    }

    pub fn grace_period(&self) -> Result<Duration> {
        seconds("grace_period_seconds", self.grace_period_seconds)
    }
}

/// Per-session state of a high-knee detector.
#[derive(Debug, Clone)]
pub struct HighKneeState {
    pub left: Phase,
    pub right: Phase,
    counter: RepCounter,
    left_knee: SmoothingBuffer<Point>,
    right_knee: SmoothingBuffer<Point>,
    tracking: Tracking,
}

impl HighKneeState {
    pub fn counter(&self) -> &RepCounter {
        &self.counter
    }

    fn reset_phases(&mut self) -> (Phase, Phase) {
        self.left = Phase::Down;
        self.right = Phase::Down;
        (self.left, self.right)
    }
}

#[derive(Debug, Clone, Copy)]
struct KneeMetrics {
    height: f64,
    angle: Degrees,
}

#[derive(Debug, Clone)]
pub struct HighKneeDetector {
    profile: HighKneeProfile,
    cooldown: Duration,
    grace_period: Duration,
}

impl HighKneeDetector {
    pub fn new(profile: HighKneeProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            cooldown: profile.cooldown()?,
            grace_period: profile.grace_period()?,
            profile,
        })
    }

    pub fn profile(&self) -> &HighKneeProfile {
        &self.profile
    }

    fn measure(&self, leg: &Leg, smoothed_knee: Point) -> KneeMetrics {
        let signed = leg.hip.y - smoothed_knee.y;
        KneeMetrics {
            height: if self.profile.absolute_height { signed.abs() } else { signed },
            angle: joint_angle(leg.hip, smoothed_knee, leg.ankle),
        }
    }

    fn lifted(&self, metrics: KneeMetrics) -> bool {
        metrics.height > self.profile.lift_height
            && self.profile.up_angle.is_none_or(|up| metrics.angle > up)
    }

    fn released(&self, metrics: KneeMetrics) -> bool {
        self.profile.down_angle.is_none_or(|down| metrics.angle < down)
            && self.profile.drop_height.is_none_or(|drop| metrics.height < drop)
    }

    fn advance(&self, phase: &mut Phase, metrics: KneeMetrics) -> LimbEvent {
        match *phase {
            Phase::Up if self.released(metrics) => {
                *phase = Phase::Down;
                LimbEvent::Completed
            }
            Phase::Up => LimbEvent::Idle,
            _ if self.lifted(metrics) => {
                *phase = Phase::Up;
                LimbEvent::Armed
            }
            _ => LimbEvent::Idle,
        }
    }

    fn smoothed(buffer: &mut SmoothingBuffer<Point>, knee: Point) -> Point {
        buffer.push(knee);
        buffer.value().unwrap_or(knee)
    }
}

impl RepDetector for HighKneeDetector {
    type State = HighKneeState;

    fn name(&self) -> &'static str {
        "high-knees"
    }

    fn initial_state(&self) -> HighKneeState {
        let window = self.profile.smoothing_window;
        let mode = self.profile.smoothing;
        HighKneeState {
            left: Phase::Down,
            right: Phase::Down,
            counter: RepCounter::new(self.cooldown),
            left_knee: SmoothingBuffer::new(window, mode),
            right_knee: SmoothingBuffer::new(window, mode),
            tracking: Tracking::new(self.grace_period),
        }
    }

    fn detect(&self, state: &mut HighKneeState, frame: &PoseFrame) -> Detection {
        let now = frame.timestamp;
        let pose = frame.pose();
        let Some((left_leg, right_leg)) = pose.and_then(Landmarks::legs) else {
            let dropout = state.tracking.observe_missing(now);
            let count = state.counter.count();
            let phases = (state.left, state.right);
            let incomplete = pose.is_some();
            return dropout_detection(dropout, incomplete, count, || state.reset_phases(), phases);
        };
        state.tracking.observe_present(now);

        let left_knee = Self::smoothed(&mut state.left_knee, left_leg.knee);
        let right_knee = Self::smoothed(&mut state.right_knee, right_leg.knee);
        let left = self.measure(&left_leg, left_knee);
        let right = self.measure(&right_leg, right_knee);

        let left_event = self.advance(&mut state.left, left);
        let right_event = self.advance(&mut state.right, right);

        let completions = [left_event, right_event]
            .iter()
            .filter(|event| **event == LimbEvent::Completed)
            .count();
        let counted = state.counter.settle(completions, now);

        debug!(
            left_height = left.height,
            right_height = right.height,
            left_angle = left.angle,
            right_angle = right.angle,
            left = %state.left,
            right = %state.right,
            cooling_down = state.counter.cooling_down(now),
            "high-knee frame"
        );

        let lift = self.profile.lift_height;
        let (feedback, kind) = if let Some(count) = counted {
            (format!("High-knee rep {count} detected!"), FeedbackKind::Rep)
        } else if right_event == LimbEvent::Armed {
            ("Right knee up - good height!".to_string(), FeedbackKind::Cue)
        } else if left_event == LimbEvent::Armed {
            ("Left knee up - good height!".to_string(), FeedbackKind::Cue)
        } else if left.height < lift && right.height < lift {
            ("Lift your knees higher!".to_string(), FeedbackKind::Coaching)
        } else {
            ("Keep going!".to_string(), FeedbackKind::Coaching)
        };

        Detection {
            rep_detected: counted.is_some(),
            rep_count: state.counter.count(),
            feedback,
            kind,
            left: state.left,
            right: state.right,
        }
    }

    fn start_set(&self, state: &mut HighKneeState, now: Instant) {
        state.counter.arm(now);
    }

    fn rep_count(&self, state: &HighKneeState) -> u32 {
        state.counter.count()
    }

    fn phases(&self, state: &HighKneeState) -> (Phase, Phase) {
        (state.left, state.right)
    }
}
