// THEORY:
// This file is the main entry point for the `rep_vision` library crate. It turns a
// stream of 2D body-pose landmarks into exercise repetitions, set completions and
// rest periods.
//
// Layers, from the bottom up:
// 1.  `core_modules`: geometry, smoothing and the per-exercise rep detectors. Pure,
//     per-frame, no I/O.
// 2.  `pipeline` (push) and `workout` (pull): the two set/rest lifecycle controllers.
// 3.  `session_pool`: many concurrent sessions and blocking workers on tokio.
//
// The pose extractor, the camera and any network layer live outside this crate.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod exercise;
pub mod pipeline;
pub mod session_pool;
pub mod workout;

pub use config::SessionConfig;
pub use core_modules::detector::{Detection, FeedbackKind, Phase, RepDetector};
pub use core_modules::feedback::{ChannelSink, FeedbackSink, LogSink, RecordingSink};
pub use core_modules::high_knee::{HighKneeDetector, HighKneeProfile};
pub use core_modules::landmark::{BodyJoint, Landmarks, Point, PoseFrame};
pub use core_modules::lunge::{LungeDetector, LungeProfile};
pub use error::{RepVisionError, Result};
pub use exercise::{DetectorProfile, Exercise};
pub use pipeline::{FrameReport, LiveFrame, LivePipeline};
pub use session_pool::{spawn_workout, SessionKey, SessionRegistry, WorkoutHandle};
pub use workout::{
    cancellation, CancelHandle, CancelToken, FrameSource, RecordedFrames, WorkoutOutcome,
    WorkoutRunner,
};
