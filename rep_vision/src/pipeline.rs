// THEORY:
// The `pipeline` module is the push-mode API of the engine. A client (typically a
// request handler holding one session) hands in one frame at a time and gets a
// `FrameReport` back straight away. Nothing here blocks or sleeps: rest periods are
// tracked as a start instant and measured against the timestamps of later frames.
//
// Per call, in order:
// 1.  **Set Change**: if the caller's set index moved, per-set state is reset. The
//     first frame of every set arms the rep cooldown.
// 2.  **Rest Gate**: while resting, detection is skipped and the remaining rest time
//     is reported. The first frame at or past the rest duration ends the rest.
// 3.  **Detection**: otherwise the detector runs. Reaching the target closes the set
//     and starts the rest timer, or finishes the workout after the last set.
//
// The controller never advances the set index itself. The caller owns it.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::core_modules::detector::{Phase, RepDetector};
use crate::core_modules::landmark::PoseFrame;
use crate::error::Result;

pub const REST_COMPLETED: &str = "Rest completed! Start next set.";
pub const SET_COMPLETED: &str = "Set completed! Starting rest period.";
pub const WORKOUT_COMPLETED: &str = "Workout complete!";

/// One frame pushed by the client.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    pub pose: PoseFrame,
    /// The set the client believes it is in.
    pub current_set: u32,
}

impl LiveFrame {
    pub fn new(pose: PoseFrame, current_set: u32) -> Self {
        Self { pose, current_set }
    }
}

/// The response to a single pushed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub rep_detected: bool,
    pub feedback: String,
    /// Reps in the current set.
    pub rep_count: u32,
    /// Reps across every set of this exercise.
    pub total_reps: u32,
    pub current_set: u32,
    pub set_completed: bool,
    pub rest_active: bool,
    pub rest_seconds_remaining: f64,
    /// The client may stop streaming frames until the rest is over.
    pub should_release_camera: bool,
    pub workout_completed: bool,
    pub left_state: Phase,
    pub right_state: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetPhase {
    Active,
    Resting {
        since: Instant,
        /// Smallest remaining time reported so far.
        remaining: Duration,
    },
    Finished,
}

/// Where the session stands in its set/rest plan.
#[derive(Debug, Clone, PartialEq)]
pub struct SetState {
    /// Last set index the caller sent, `None` before the first frame.
    pub current_set: Option<u32>,
    pub total_reps: u32,
    pub sets_completed: u32,
    pub phase: SetPhase,
}

impl SetState {
    fn new() -> Self {
        Self {
            current_set: None,
            total_reps: 0,
            sets_completed: 0,
            phase: SetPhase::Active,
        }
    }

    pub fn is_resting(&self) -> bool {
        matches!(self.phase, SetPhase::Resting { .. })
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SetPhase::Finished
    }
}

/// Incremental lifecycle controller for one session and one exercise.
pub struct LivePipeline<D: RepDetector> {
    detector: D,
    detector_state: D::State,
    config: SessionConfig,
    rest: Duration,
    set: SetState,
}

impl<D: RepDetector> LivePipeline<D> {
    pub fn new(detector: D, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let rest = config.rest_duration()?;
        let detector_state = detector.initial_state();
        Ok(Self {
            detector,
            detector_state,
            config,
            rest,
            set: SetState::new(),
        })
    }

    pub fn process_frame(&mut self, frame: LiveFrame) -> FrameReport {
        let now = frame.pose.timestamp;

        // Stage 1: Set Change
        match self.set.current_set {
            Some(previous) if previous != frame.current_set && !self.set.is_finished() => {
                debug!(
                    previous,
                    next = frame.current_set,
                    "set index changed, resetting set state"
                );
                self.reset_set(now);
                self.set.current_set = Some(frame.current_set);
            }
            None => {
                self.detector.start_set(&mut self.detector_state, now);
                self.set.current_set = Some(frame.current_set);
            }
            _ => {}
        }

        // Stage 2: Rest Gate
        match self.set.phase {
            SetPhase::Finished => return self.report(false, WORKOUT_COMPLETED.to_string()),
            SetPhase::Resting { since, remaining } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed < self.rest {
                    let remaining = remaining.min(self.rest - elapsed);
                    self.set.phase = SetPhase::Resting { since, remaining };
                    let feedback = format!("Resting: {:.1}s remaining", remaining.as_secs_f64());
                    return self.report(false, feedback);
                }
                info!(set = self.current_set(), "rest completed");
                self.reset_set(now);
                return self.report(false, REST_COMPLETED.to_string());
            }
            SetPhase::Active => {}
        }

        // Stage 3: Detection
        let detection = self.detector.detect(&mut self.detector_state, &frame.pose);
        if detection.rep_detected {
            self.set.total_reps += 1;
            info!(
                exercise = self.detector.name(),
                rep = detection.rep_count,
                total = self.set.total_reps,
                "rep counted"
            );
        }

        if detection.rep_count >= self.config.target_reps_per_set {
            self.set.sets_completed += 1;
            if self.set.sets_completed >= self.config.total_sets {
                info!(
                    sets = self.set.sets_completed,
                    total = self.set.total_reps,
                    "workout completed"
                );
                self.set.phase = SetPhase::Finished;
                return self.report(detection.rep_detected, WORKOUT_COMPLETED.to_string());
            }
            info!(set = self.current_set(), reps = detection.rep_count, "set completed, resting");
            self.set.phase = SetPhase::Resting {
                since: now,
                remaining: self.rest,
            };
            return self.report(detection.rep_detected, SET_COMPLETED.to_string());
        }

        self.report(detection.rep_detected, detection.feedback)
    }

    /// Clears phases, buffers, the per-set counter and any rest marker, then arms the
    /// counter at `now`. Total reps and completed sets survive.
    fn reset_set(&mut self, now: Instant) {
        self.detector_state = self.detector.initial_state();
        self.detector.start_set(&mut self.detector_state, now);
        self.set.phase = SetPhase::Active;
    }

    fn current_set(&self) -> u32 {
        self.set.current_set.unwrap_or_default()
    }

    fn report(&self, rep_detected: bool, feedback: String) -> FrameReport {
        let (left_state, right_state) = self.detector.phases(&self.detector_state);
        let (set_completed, rest_active, remaining, workout_completed) = match self.set.phase {
            SetPhase::Active => (false, false, Duration::ZERO, false),
            SetPhase::Resting { remaining, .. } => (true, true, remaining, false),
            SetPhase::Finished => (true, false, Duration::ZERO, true),
        };

        FrameReport {
            rep_detected,
            feedback,
            rep_count: self.detector.rep_count(&self.detector_state),
            total_reps: self.set.total_reps,
            current_set: self.current_set(),
            set_completed,
            rest_active,
            rest_seconds_remaining: remaining.as_secs_f64(),
            should_release_camera: set_completed,
            workout_completed,
            left_state,
            right_state,
        }
    }

    pub fn set_state(&self) -> &SetState {
        &self.set
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_state(&self) -> &D::State {
        &self.detector_state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::high_knee::{HighKneeDetector, HighKneeProfile};
    use crate::core_modules::landmark::Landmarks;
    use crate::core_modules::lunge::tests::{left_lunge, standing};
    use crate::core_modules::lunge::{LungeDetector, LungeProfile};

    fn at(start: Instant, seconds: f64) -> Instant {
        start + Duration::from_secs_f64(seconds)
    }

    fn lunge_pipeline(config: SessionConfig) -> LivePipeline<LungeDetector> {
        let detector = LungeDetector::new(LungeProfile::step_back()).unwrap();
        LivePipeline::new(detector, config).unwrap()
    }

    fn frame(pose: Landmarks, start: Instant, t: f64, set: u32) -> LiveFrame {
        LiveFrame::new(PoseFrame::detected(pose, at(start, t)), set)
    }

    /// Runs `cycles` lunges with frames 0.5 s apart, starting at `t`. Returns the
    /// last report and the time of the next frame.
    fn lunge_cycles(
        pipeline: &mut LivePipeline<LungeDetector>,
        start: Instant,
        mut t: f64,
        set: u32,
        cycles: u32,
    ) -> (FrameReport, f64) {
        let mut last = None;
        for _ in 0..cycles {
            pipeline.process_frame(frame(left_lunge(), start, t, set));
            t += 0.5;
            last = Some(pipeline.process_frame(frame(standing(), start, t, set)));
            t += 0.5;
        }
        (last.unwrap(), t)
    }

    #[test]
    fn completed_set_rests_then_resumes() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(5, 3, 2.0));
        let start = Instant::now();

        let (done, mut t) = lunge_cycles(&mut pipeline, start, 0.0, 1, 5);
        assert!(done.rep_detected);
        assert!(done.set_completed);
        assert!(done.rest_active);
        assert!(done.should_release_camera);
        assert_eq!(done.rep_count, 5);
        assert_eq!(done.total_reps, 5);
        assert_eq!(done.feedback, SET_COMPLETED);
        assert!((done.rest_seconds_remaining - 2.0).abs() < 1e-9);
        let rest_started = t - 0.5;

        let mut previous = done.rest_seconds_remaining;
        while t < rest_started + 2.0 {
            // A lunge while resting is ignored.
            let resting = pipeline.process_frame(frame(left_lunge(), start, t, 1));
            assert!(resting.rest_active);
            assert!(resting.set_completed);
            assert!(!resting.rep_detected);
            assert!(resting.rest_seconds_remaining <= previous);
            assert!(resting.rest_seconds_remaining > 0.0);
            previous = resting.rest_seconds_remaining;
            t += 0.5;
        }

        let resumed = pipeline.process_frame(frame(standing(), start, t, 1));
        assert_eq!(resumed.feedback, REST_COMPLETED);
        assert!(!resumed.rest_active);
        assert!(!resumed.set_completed);
        assert_eq!(resumed.rep_count, 0);
        assert_eq!(resumed.total_reps, 5);
        assert_eq!(
            (resumed.left_state, resumed.right_state),
            (Phase::Standing, Phase::Standing)
        );

        // Later frames of the resumed set count from zero again.
        let (next, _) = lunge_cycles(&mut pipeline, start, t + 0.5, 2, 1);
        assert_eq!(next.rep_count, 1);
        assert_eq!(next.total_reps, 6);
        assert_eq!(next.current_set, 2);
    }

    #[test]
    fn remaining_rest_never_grows_on_out_of_order_frames() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(1, 2, 10.0));
        let start = Instant::now();
        let (done, t) = lunge_cycles(&mut pipeline, start, 0.0, 1, 1);
        assert!(done.rest_active);

        let later =
            pipeline.process_frame(LiveFrame::new(PoseFrame::missing(at(start, t + 3.0)), 1));
        let earlier = pipeline.process_frame(LiveFrame::new(PoseFrame::missing(at(start, t)), 1));
        assert!(earlier.rest_seconds_remaining <= later.rest_seconds_remaining);
        assert!(earlier.rest_active);
    }

    #[test]
    fn set_change_resets_mid_set() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(5, 3, 2.0));
        let start = Instant::now();

        let (partial, t) = lunge_cycles(&mut pipeline, start, 0.0, 1, 2);
        assert_eq!(partial.rep_count, 2);

        let armed = pipeline.process_frame(frame(left_lunge(), start, t, 1));
        assert_eq!(armed.left_state, Phase::Lunging);

        let moved = pipeline.process_frame(frame(standing(), start, t + 0.5, 2));
        assert!(!moved.rep_detected);
        assert_eq!(moved.rep_count, 0);
        assert_eq!(moved.total_reps, 2);
        assert_eq!(moved.current_set, 2);
    }

    #[test]
    fn last_set_finishes_without_rest() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(1, 1, 20.0));
        let start = Instant::now();

        let (report, t) = lunge_cycles(&mut pipeline, start, 0.0, 1, 1);
        assert!(report.workout_completed);
        assert!(!report.rest_active);
        assert_eq!(report.feedback, WORKOUT_COMPLETED);

        let after = pipeline.process_frame(frame(left_lunge(), start, t, 2));
        assert!(after.workout_completed);
        assert!(!after.rep_detected);
        assert_eq!(after.total_reps, 1);
        assert_eq!(after.current_set, 1);
        assert!(pipeline.set_state().is_finished());
    }

    #[test]
    fn high_knee_sessions_report_knee_phases() {
        let detector = HighKneeDetector::new(HighKneeProfile::live()).unwrap();
        let mut pipeline = LivePipeline::new(detector, SessionConfig::default()).unwrap();
        let report = pipeline.process_frame(LiveFrame::new(PoseFrame::missing(Instant::now()), 1));
        assert_eq!((report.left_state, report.right_state), (Phase::Down, Phase::Down));
        assert_eq!(report.feedback, "No pose detected. Stay in frame.");
        assert!(!report.workout_completed);
    }

    #[test]
    fn invalid_config_is_rejected_at_setup() {
        let detector = LungeDetector::new(LungeProfile::step_back()).unwrap();
        assert!(LivePipeline::new(detector.clone(), SessionConfig::new(0, 1, 1.0)).is_err());
        assert!(LivePipeline::new(detector, SessionConfig::new(1, 2, 1e20)).is_err());
    }

    #[test]
    fn reps_inside_the_cooldown_of_a_set_start_are_ignored() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(5, 2, 1.0));
        let start = Instant::now();

        pipeline.process_frame(frame(left_lunge(), start, 0.0, 1));
        let early = pipeline.process_frame(frame(standing(), start, 0.05, 1));
        assert!(!early.rep_detected);
        assert_eq!(early.rep_count, 0);
        assert_eq!(early.left_state, Phase::Standing);

        let (counted, _) = lunge_cycles(&mut pipeline, start, 0.5, 1, 1);
        assert!(counted.rep_detected);
        assert_eq!(counted.rep_count, 1);
    }

    #[test]
    fn set_change_arms_the_cooldown_again() {
        let mut pipeline = lunge_pipeline(SessionConfig::new(5, 2, 1.0));
        let start = Instant::now();

        let (first, t) = lunge_cycles(&mut pipeline, start, 0.0, 1, 1);
        assert_eq!(first.rep_count, 1);

        pipeline.process_frame(frame(left_lunge(), start, t, 2));
        let early = pipeline.process_frame(frame(standing(), start, t + 0.05, 2));
        assert!(!early.rep_detected);
        assert_eq!(early.total_reps, 1);
    }
}
