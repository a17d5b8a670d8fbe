// THEORY:
// The `workout` module is the pull-mode API: the engine owns the frame loop and runs
// a whole exercise, every set and every rest, before returning. It is meant to run
// on a dedicated blocking worker (see `session_pool::spawn_workout`).
//
// Key architectural principles:
// 1.  **Source per Set**: the `FrameSource` is opened at the start of every set and
//     closed at its end, so a camera is released during rests. A source that cannot
//     be opened ends the run with the reps gathered so far.
// 2.  **Announcements Only**: only feedback worth saying out loud reaches the sink
//     (reps, arming cues, tracking loss and reset). Per-frame coaching stays silent.
// 3.  **Cancellable Rest**: the rest between sets is a `CancelToken::wait_timeout`,
//     never a plain sleep, and cancellation is also checked between frame reads.

use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::core_modules::detector::RepDetector;
use crate::core_modules::feedback::FeedbackSink;
use crate::core_modules::landmark::PoseFrame;
use crate::error::{RepVisionError, Result};

/// Anything that yields pose frames on demand: a camera plus extractor, a recording.
pub trait FrameSource {
    fn open(&mut self) -> Result<()>;

    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<PoseFrame>;

    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Option<PoseFrame> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Replays pre-extracted frames. Every set continues where the previous one
/// stopped; opening an exhausted recording fails.
#[derive(Debug, Clone, Default)]
pub struct RecordedFrames {
    frames: VecDeque<PoseFrame>,
}

impl RecordedFrames {
    pub fn new(frames: impl IntoIterator<Item = PoseFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for RecordedFrames {
    fn open(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(RepVisionError::source_unavailable("recording exhausted"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<PoseFrame> {
        self.frames.pop_front()
    }
}

/// Creates a linked cancel handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded(1);
    let flag = Arc::new(AtomicBool::new(false));
    (
        CancelHandle {
            tx,
            flag: Arc::clone(&flag),
        },
        CancelToken { rx, flag },
    )
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.try_send(());
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
    flag: Arc<AtomicBool>,
}

enum Wake {
    Cancelled,
    HandleDropped,
    TimedOut,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout`. Returns `true` if cancelled before or during the wait.
    /// With every handle dropped the full timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let deadline = after(timeout);
        let wake = select! {
            recv(self.rx) -> message => match message {
                Ok(()) => Wake::Cancelled,
                Err(_) => Wake::HandleDropped,
            },
            recv(deadline) -> _ => Wake::TimedOut,
        };
        match wake {
            Wake::Cancelled => true,
            Wake::HandleDropped => {
                let _ = deadline.recv();
                self.is_cancelled()
            }
            Wake::TimedOut => self.is_cancelled(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutOutcome {
    /// Every set reached its target.
    pub completed: bool,
    pub cancelled: bool,
    pub total_reps: u32,
    pub reps_per_set: Vec<u32>,
}

/// Blocking lifecycle controller.
#[derive(Debug, Clone)]
pub struct WorkoutRunner<D: RepDetector> {
    detector: D,
    config: SessionConfig,
    rest: Duration,
}

impl<D: RepDetector> WorkoutRunner<D> {
    pub fn new(detector: D, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let rest = config.rest_duration()?;
        Ok(Self {
            detector,
            config,
            rest,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn run<S, F>(&self, source: &mut S, sink: &mut F, cancel: &CancelToken) -> WorkoutOutcome
    where
        S: FrameSource + ?Sized,
        F: FeedbackSink + ?Sized,
    {
        let total_sets = self.config.total_sets;
        let target = self.config.target_reps_per_set;
        let mut outcome = WorkoutOutcome::default();

        for set in 1..=total_sets {
            if cancel.is_cancelled() {
                return cancelled(outcome, sink);
            }
            if let Err(err) = source.open() {
                warn!(%err, set, exercise = self.detector.name(), "could not open frame source");
                sink.emit(&format!("Unable to start set {set}: {err}"));
                return outcome;
            }

            sink.emit(&format!("Starting set {set} of {total_sets}. Target: {target} reps."));
            let reps = self.run_set(source, sink, cancel);
            source.close();

            outcome.reps_per_set.push(reps);
            outcome.total_reps += reps;

            if cancel.is_cancelled() {
                return cancelled(outcome, sink);
            }
            if reps < target {
                warn!(set, reps, target, "frame source ended mid-set");
                sink.emit(&format!(
                    "Frame source ended before set {set} was complete. Reps: {reps}"
                ));
                return outcome;
            }

            info!(set, reps, exercise = self.detector.name(), "set complete");
            sink.emit(&format!("Set {set} complete. Reps: {reps}"));

            if set < total_sets {
                sink.emit(&format!(
                    "Resting for {} seconds before next set...",
                    self.config.rest_duration_seconds
                ));
                if cancel.wait_timeout(self.rest) {
                    return cancelled(outcome, sink);
                }
            }
        }

        outcome.completed = true;
        sink.emit(&format!("Workout complete! Total reps: {}", outcome.total_reps));
        outcome
    }

    fn run_set<S, F>(&self, source: &mut S, sink: &mut F, cancel: &CancelToken) -> u32
    where
        S: FrameSource + ?Sized,
        F: FeedbackSink + ?Sized,
    {
        let mut state = self.detector.initial_state();
        let mut armed = false;
        while !cancel.is_cancelled() {
            let Some(frame) = source.next_frame() else {
                break;
            };
            if !armed {
                self.detector.start_set(&mut state, frame.timestamp);
                armed = true;
            }
            let detection = self.detector.detect(&mut state, &frame);
            if detection.kind.is_announcement() {
                sink.emit(&detection.feedback);
            }
            if detection.rep_count >= self.config.target_reps_per_set {
                break;
            }
        }
        self.detector.rep_count(&state)
    }
}

fn cancelled<F: FeedbackSink + ?Sized>(
    mut outcome: WorkoutOutcome,
    sink: &mut F,
) -> WorkoutOutcome {
    info!(total = outcome.total_reps, "workout cancelled");
    sink.emit("Workout cancelled.");
    outcome.cancelled = true;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::feedback::RecordingSink;
    use crate::core_modules::lunge::tests::{left_lunge, standing};
    use crate::core_modules::lunge::{LungeDetector, LungeProfile};
    use std::thread;
    use std::time::Instant;

    fn lunge_frames(cycles: u32) -> RecordedFrames {
        let start = Instant::now();
        let frames = (0..cycles).flat_map(|cycle| {
            let t = Duration::from_secs(cycle as u64);
            [
                PoseFrame::detected(left_lunge(), start + t),
                PoseFrame::detected(standing(), start + t + Duration::from_millis(500)),
            ]
        });
        RecordedFrames::new(frames)
    }

    fn runner(reps: u32, sets: u32, rest: f64) -> WorkoutRunner<LungeDetector> {
        let detector = LungeDetector::new(LungeProfile::step_back()).unwrap();
        WorkoutRunner::new(detector, SessionConfig::new(reps, sets, rest)).unwrap()
    }

    #[test]
    fn runs_every_set_and_announces_progress() {
        let runner = runner(2, 2, 0.01);
        let (_handle, token) = cancellation();
        let mut source = lunge_frames(4);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(outcome.completed);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.total_reps, 4);
        assert_eq!(outcome.reps_per_set, vec![2, 2]);
        assert_eq!(source.remaining(), 0);

        let messages = sink.messages();
        assert!(messages.contains(&"Set 1 complete. Reps: 2".to_string()));
        assert!(messages.contains(&"Set 2 complete. Reps: 2".to_string()));
        assert_eq!(messages.iter().filter(|m| m.starts_with("Resting for")).count(), 1);
        assert_eq!(messages.iter().filter(|m| m.starts_with("Lunge rep")).count(), 4);
        assert!(!messages.iter().any(|m| m == "Lower your back knee!"));
    }

    #[test]
    fn unavailable_source_stops_with_partial_reps() {
        let runner = runner(2, 3, 0.0);
        let (_handle, token) = cancellation();
        let mut source = lunge_frames(2);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(!outcome.completed);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.reps_per_set, vec![2]);
        assert!(sink.messages().last().unwrap().starts_with("Unable to start set 2"));
    }

    #[test]
    fn source_ending_mid_set_is_incomplete() {
        let runner = runner(3, 1, 0.0);
        let (_handle, token) = cancellation();
        let mut source = lunge_frames(2);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(!outcome.completed);
        assert_eq!(outcome.total_reps, 2);
    }

    #[test]
    fn tracking_loss_is_announced() {
        let runner = runner(1, 1, 0.0);
        let (_handle, token) = cancellation();
        let start = Instant::now();
        let mut source = RecordedFrames::new([
            PoseFrame::missing(start),
            PoseFrame::missing(start + Duration::from_millis(100)),
            PoseFrame::detected(left_lunge(), start + Duration::from_millis(200)),
            PoseFrame::detected(standing(), start + Duration::from_millis(700)),
        ]);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(outcome.completed);
        let lost = sink
            .messages()
            .iter()
            .filter(|m| *m == "No pose detected. Stay in frame.")
            .count();
        assert_eq!(lost, 1);
    }

    #[test]
    fn cancel_before_start_returns_immediately() {
        let runner = runner(2, 2, 60.0);
        let (handle, token) = cancellation();
        handle.cancel();
        let mut source = lunge_frames(4);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(outcome.cancelled);
        assert!(!outcome.completed);
        assert_eq!(outcome.total_reps, 0);
        assert_eq!(source.remaining(), 8);
    }

    #[test]
    fn cancel_interrupts_the_rest_wait() {
        let runner = runner(1, 2, 60.0);
        let (handle, token) = cancellation();
        let mut source = lunge_frames(2);
        let mut sink = RecordingSink::new();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });
        let started = Instant::now();
        let outcome = runner.run(&mut source, &mut sink, &token);
        canceller.join().unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.reps_per_set, vec![1]);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn dropped_handle_waits_out_the_timeout() {
        let (handle, token) = cancellation();
        drop(handle);
        let started = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn first_frame_of_a_set_arms_the_cooldown() {
        let runner = runner(1, 1, 0.0);
        let (_handle, token) = cancellation();
        let start = Instant::now();
        let mut source = RecordedFrames::new([
            PoseFrame::detected(left_lunge(), start),
            PoseFrame::detected(standing(), start + Duration::from_millis(50)),
        ]);
        let mut sink = RecordingSink::new();

        let outcome = runner.run(&mut source, &mut sink, &token);
        assert!(!outcome.completed);
        assert_eq!(outcome.reps_per_set, vec![0]);
    }

    #[test]
    fn rest_longer_than_a_duration_is_rejected() {
        let detector = LungeDetector::new(LungeProfile::step_back()).unwrap();
        assert!(WorkoutRunner::new(detector, SessionConfig::new(1, 2, 1e20)).is_err());
    }
}
