// THEORY:
// The `LungeDetector` counts alternating step-back lunges. There is one
// standing/lunging machine per forward leg, and each machine is driven by the
// *opposite* knee's angle together with its own knee's height above the hips:
//
//     left phase  <- right knee angle, left knee height
//     right phase <- left knee angle,  right knee height
//
// Stepping back with one leg bends the other (front) knee, and the stepping knee
// drops toward the floor. The cross-wiring reads each lunge from the pair of joints
// that actually move during it.
//
// Key architectural principles:
// 1.  **Hysteresis**: a leg enters the lunge below `entry_angle` and only leaves above
//     `exit_angle`, which is strictly larger. Jitter around a single threshold can
//     therefore never produce a rep.
// 2.  **Knee Height Gate**: leaving the lunge also requires the knee to be back near
//     hip level (below half of `knee_height_threshold`), so a half-rise does not count.
// 3.  **Smoothed Heights, Raw Angles**: hip and knee heights go through recency-weighted
//     buffers; angles come straight from the frame's landmarks.
// 4.  **Grace Period**: see `detector::Tracking`. A long dropout returns both legs to
//     standing and keeps the count.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::seconds;
use crate::core_modules::detector::{
    dropout_detection, Detection, FeedbackKind, LimbEvent, Phase, RepDetector, Tracking,
};
use crate::core_modules::geometry::geometry::{joint_angle, Degrees};
use crate::core_modules::landmark::{Landmarks, Leg, PoseFrame};
use crate::core_modules::rep_counter::RepCounter;
use crate::core_modules::smoothing::{SmoothingBuffer, SmoothingMode, DEFAULT_SMOOTHING_WINDOW};
use crate::error::{RepVisionError, Result};

/// Margin above the entry angle at which the coaching switches to "almost there".
const ALMOST_THERE_MARGIN: Degrees = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LungeProfile {
    /// Driving knee angle below which a leg enters the lunge.
    pub entry_angle: Degrees,
    /// Driving knee angle above which a leg may return to standing.
    pub exit_angle: Degrees,
    /// Knee height scale; the leg must be below half of it to stand up.
    pub knee_height_threshold: f64,
    pub cooldown_seconds: f64,
    pub grace_period_seconds: f64,
    pub smoothing_window: usize,
    pub smoothing: SmoothingMode,
}

impl Default for LungeProfile {
    fn default() -> Self {
        Self::step_back()
    }
}

impl LungeProfile {
    pub fn step_back() -> Self {
        Self {
            entry_angle: 120.0,
            exit_angle: 125.0,
            knee_height_threshold: 0.01,
            cooldown_seconds: 0.1,
            grace_period_seconds: 3.0,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing: SmoothingMode::RecencyWeighted,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.entry_angle.is_finite() && self.exit_angle.is_finite()) {
            return Err(RepVisionError::config("lunge angles must be finite"));
        }
        if self.exit_angle <= self.entry_angle {
            return Err(RepVisionError::config(format!(
                "lunge exit_angle ({}) must be greater than entry_angle ({})",
                self.exit_angle, self.entry_angle
            )));
        }
        if !self.knee_height_threshold.is_finite() || self.knee_height_threshold < 0.0 {
            return Err(RepVisionError::config(
                "lunge knee_height_threshold must be a non-negative number",
            ));
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

#[derive(Debug, Clone)]
pub struct LungeState {
    pub left: Phase,
    pub right: Phase,
    counter: RepCounter,
    hip_y: SmoothingBuffer<f64>,
    left_knee_y: SmoothingBuffer<f64>,
    right_knee_y: SmoothingBuffer<f64>,
    tracking: Tracking,
}

impl LungeState {
    pub fn counter(&self) -> &RepCounter {
        &self.counter
    }

    fn reset_phases(&mut self) -> (Phase, Phase) {
        self.left = Phase::Standing;
        self.right = Phase::Standing;
        (self.left, self.right)
    }
}

/// Inputs of one leg's machine for one frame.
#[derive(Debug, Clone, Copy)]
struct LungeDrive {
    /// Angle of the opposite (front) knee.
    angle: Degrees,
    /// Height of this leg's knee above the smoothed hips, floored at zero.
    knee_height: f64,
}

#[derive(Debug, Clone)]
pub struct LungeDetector {
    profile: LungeProfile,
    cooldown: Duration,
    grace_period: Duration,
}

impl LungeDetector {
    pub fn new(profile: LungeProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            cooldown: profile.cooldown()?,
            grace_period: profile.grace_period()?,
            profile,
        })
    }

    pub fn profile(&self) -> &LungeProfile {
        &self.profile
    }

    fn advance(&self, phase: &mut Phase, drive: LungeDrive) -> LimbEvent {
        match *phase {
            Phase::Lunging
                if drive.angle > self.profile.exit_angle
                    && drive.knee_height < self.profile.knee_height_threshold / 2.0 =>
            {
                *phase = Phase::Standing;
                LimbEvent::Completed
            }
            Phase::Lunging => LimbEvent::Idle,
            _ if drive.angle < self.profile.entry_angle => {
                *phase = Phase::Lunging;
                LimbEvent::Armed
            }
            _ => LimbEvent::Idle,
        }
    }

    fn smoothed(buffer: &mut SmoothingBuffer<f64>, sample: f64) -> f64 {
        buffer.push(sample);
        buffer.value().unwrap_or(sample)
    }

    fn knee_angle(leg: &Leg) -> Degrees {
        joint_angle(leg.hip, leg.knee, leg.ankle)
    }

    fn coaching(&self, left_angle: Degrees, right_angle: Degrees) -> &'static str {
        let entry = self.profile.entry_angle;
        if left_angle > entry && right_angle > entry {
            if left_angle.min(right_angle) < entry + ALMOST_THERE_MARGIN {
                "Almost there! Bend your front knee a bit more!"
            } else {
                "Bend your front knee more!"
            }
        } else {
            "Lower your back knee!"
        }
    }
}

impl RepDetector for LungeDetector {
    type State = LungeState;

    fn name(&self) -> &'static str {
        "step-back-lunge"
    }

    fn initial_state(&self) -> LungeState {
        let window = self.profile.smoothing_window;
        let mode = self.profile.smoothing;
        LungeState {
            left: Phase::Standing,
            right: Phase::Standing,
            counter: RepCounter::new(self.cooldown),
            hip_y: SmoothingBuffer::new(window, mode),
            left_knee_y: SmoothingBuffer::new(window, mode),
            right_knee_y: SmoothingBuffer::new(window, mode),
            tracking: Tracking::new(self.grace_period),
        }
    }

    fn detect(&self, state: &mut LungeState, frame: &PoseFrame) -> Detection {
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

        let mid_hip_y = (left_leg.hip.y + right_leg.hip.y) / 2.0;
        let hip_y = Self::smoothed(&mut state.hip_y, mid_hip_y);
        let left_knee_y = Self::smoothed(&mut state.left_knee_y, left_leg.knee.y);
        let right_knee_y = Self::smoothed(&mut state.right_knee_y, right_leg.knee.y);

        let left_angle = Self::knee_angle(&left_leg);
        let right_angle = Self::knee_angle(&right_leg);
        let left_height = (hip_y - left_knee_y).max(0.0);
        let right_height = (hip_y - right_knee_y).max(0.0);

        let left_event = self.advance(
            &mut state.left,
            LungeDrive { angle: right_angle, knee_height: left_height },
        );
        let right_event = self.advance(
            &mut state.right,
            LungeDrive { angle: left_angle, knee_height: right_height },
        );

        let completions = [left_event, right_event]
            .iter()
            .filter(|event| **event == LimbEvent::Completed)
            .count();
        let counted = state.counter.settle(completions, now);

        debug!(
            left_angle,
            right_angle,
            left_height,
            right_height,
            left = %state.left,
            right = %state.right,
            "lunge frame"
        );

        let (feedback, kind) = if let Some(count) = counted {
            (format!("Lunge rep {count}!"), FeedbackKind::Rep)
        } else if left_event == LimbEvent::Armed {
            ("Left leg lunge - good depth!".to_string(), FeedbackKind::Cue)
        } else if right_event == LimbEvent::Armed {
            ("Right leg lunge - good depth!".to_string(), FeedbackKind::Cue)
        } else {
            (self.coaching(left_angle, right_angle).to_string(), FeedbackKind::Coaching)
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

    fn start_set(&self, state: &mut LungeState, now: Instant) {
        state.counter.arm(now);
    }

    fn rep_count(&self, state: &LungeState) -> u32 {
        state.counter.count()
    }

    fn phases(&self, state: &LungeState) -> (Phase, Phase) {
        (state.left, state.right)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core_modules::detector::MOVE_CLOSER;
    use crate::core_modules::high_knee::tests::leg;
    use crate::core_modules::landmark::Side;

    /// Both knees below the hips, legs nearly straight.
    pub(crate) fn standing() -> Landmarks {
        let landmarks = leg(Landmarks::new(), Side::Left, 0.45, -0.2, 170.0);
        leg(landmarks, Side::Right, 0.55, -0.2, 170.0)
    }

    /// Right knee bent to 90 degrees, which drives the left leg's machine.
    pub(crate) fn left_lunge() -> Landmarks {
        let landmarks = leg(Landmarks::new(), Side::Left, 0.45, -0.2, 170.0);
        leg(landmarks, Side::Right, 0.55, -0.2, 90.0)
    }

    /// Left knee bent to 90 degrees, which drives the right leg's machine.
    pub(crate) fn right_lunge() -> Landmarks {
        let landmarks = leg(Landmarks::new(), Side::Left, 0.45, -0.2, 90.0);
        leg(landmarks, Side::Right, 0.55, -0.2, 170.0)
    }

    fn angles(left: f64, right: f64) -> Landmarks {
        let landmarks = leg(Landmarks::new(), Side::Left, 0.45, -0.2, left);
        leg(landmarks, Side::Right, 0.55, -0.2, right)
    }

    fn frame(landmarks: Landmarks, start: Instant, seconds: f64) -> PoseFrame {
        PoseFrame::detected(landmarks, at(start, seconds))
    }

    fn at(start: Instant, seconds: f64) -> Instant {
        start + Duration::from_secs_f64(seconds)
    }

    fn detector() -> LungeDetector {
        LungeDetector::new(LungeProfile::step_back()).unwrap()
    }

    #[test]
    fn opposite_knee_drives_each_leg() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        let armed = detector.detect(&mut state, &PoseFrame::detected(left_lunge(), start));
        assert_eq!((armed.left, armed.right), (Phase::Lunging, Phase::Standing));
        assert_eq!(armed.feedback, "Left leg lunge - good depth!");

        let rep = detector.detect(&mut state, &frame(standing(), start, 0.5));
        assert!(rep.rep_detected);
        assert_eq!(rep.feedback, "Lunge rep 1!");

        let armed = detector.detect(&mut state, &frame(right_lunge(), start, 1.0));
        assert_eq!((armed.left, armed.right), (Phase::Standing, Phase::Lunging));
        assert_eq!(armed.feedback, "Right leg lunge - good depth!");

        let rep = detector.detect(&mut state, &frame(standing(), start, 1.5));
        assert_eq!(rep.rep_count, 2);
    }

    #[test]
    fn hysteresis_band_holds_the_lunge() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        detector.detect(&mut state, &PoseFrame::detected(left_lunge(), start));
        // Between entry (120) and exit (125): still lunging.
        let held = detector.detect(&mut state, &frame(angles(170.0, 122.0), start, 0.5));
        assert_eq!(held.left, Phase::Lunging);
        assert!(!held.rep_detected);

        let rep = detector.detect(&mut state, &frame(angles(170.0, 126.0), start, 1.0));
        assert!(rep.rep_detected);
        assert_eq!(rep.left, Phase::Standing);
    }

    #[test]
    fn raised_knee_blocks_the_return_to_standing() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        // Left knee well above the hip line throughout.
        let arming = leg(Landmarks::new(), Side::Left, 0.45, 0.1, 170.0);
        let arming = leg(arming, Side::Right, 0.55, -0.2, 90.0);
        detector.detect(&mut state, &PoseFrame::detected(arming, start));
        assert_eq!(state.left, Phase::Lunging);

        let raised = leg(Landmarks::new(), Side::Left, 0.45, 0.1, 170.0);
        let raised = leg(raised, Side::Right, 0.55, -0.2, 170.0);
        for i in 1..=3 {
            let detection = detector.detect(
                &mut state,
                &frame(raised.clone(), start, 0.2 * i as f64),
            );
            assert_eq!(detection.left, Phase::Lunging);
            assert!(!detection.rep_detected);
        }
    }

    #[test]
    fn coaching_depends_on_how_close_the_front_knee_is() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        let almost = detector.detect(&mut state, &PoseFrame::detected(angles(170.0, 125.0), start));
        assert_eq!(almost.feedback, "Almost there! Bend your front knee a bit more!");
        assert_eq!(almost.kind, FeedbackKind::Coaching);

        let far = detector.detect(&mut state, &frame(angles(170.0, 160.0), start, 0.1));
        assert_eq!(far.feedback, "Bend your front knee more!");
    }

    #[test]
    fn recovery_after_grace_period_needs_a_fresh_lunge() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        detector.detect(&mut state, &PoseFrame::detected(left_lunge(), start));
        assert_eq!(state.left, Phase::Lunging);

        let brief = detector.detect(&mut state, &PoseFrame::missing(at(start, 1.0)));
        assert_eq!(brief.feedback, "No pose detected. Stay in frame.");
        assert_eq!(brief.left, Phase::Lunging);

        let expired = detector.detect(&mut state, &PoseFrame::missing(at(start, 3.5)));
        assert_eq!(expired.feedback, MOVE_CLOSER);
        assert_eq!((expired.left, expired.right), (Phase::Standing, Phase::Standing));

        let armed = detector.detect(&mut state, &frame(left_lunge(), start, 4.0));
        assert!(!armed.rep_detected);
        assert_eq!(armed.left, Phase::Lunging);

        let rep = detector.detect(&mut state, &frame(standing(), start, 4.5));
        assert!(rep.rep_detected);
        assert_eq!(rep.rep_count, 1);
    }

    #[test]
    fn exit_must_exceed_entry() {
        let profile = LungeProfile {
            exit_angle: 120.0,
            ..LungeProfile::step_back()
        };
        assert!(LungeDetector::new(profile).is_err());
        assert!(LungeProfile::default().validate().is_ok());
    }

    #[test]
    fn both_legs_standing_up_together_count_once() {
        let detector = detector();
        let mut state = detector.initial_state();
        let start = Instant::now();

        let both = detector.detect(&mut state, &PoseFrame::detected(angles(90.0, 90.0), start));
        assert_eq!((both.left, both.right), (Phase::Lunging, Phase::Lunging));

        let rep = detector.detect(&mut state, &frame(standing(), start, 0.5));
        assert!(rep.rep_detected);
        assert_eq!(rep.rep_count, 1);
        assert_eq!((rep.left, rep.right), (Phase::Standing, Phase::Standing));

        let still = detector.detect(&mut state, &frame(standing(), start, 1.0));
        assert!(!still.rep_detected);
        assert_eq!(detector.rep_count(&state), 1);
    }

    #[test]
    fn out_of_range_cooldown_is_rejected() {
        let profile = LungeProfile {
            cooldown_seconds: 1e20,
            ..LungeProfile::step_back()
        };
        assert!(matches!(
            LungeDetector::new(profile),
            Err(RepVisionError::Configuration { .. })
        ));
    }
}
