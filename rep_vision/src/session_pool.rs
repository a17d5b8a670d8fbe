// THEORY:
// The `session_pool` is the concurrency layer on top of the two lifecycle
// controllers. A host serving many users keeps one `LivePipeline` per
// (user, exercise) pair and may receive their frames on any task.
//
// Key architectural principles:
// 1.  **One Lock per Session**: the registry map sits behind an `RwLock` that is only
//     held long enough to look a session up; each session then has its own `Mutex`.
//     Frames of one session are serialized, frames of different sessions proceed in
//     parallel.
// 2.  **No Shared Mutable Data**: sessions never see each other's state.
// 3.  **Blocking Work off the Runtime**: a `WorkoutRunner` blocks on its frame source
//     and its rest waits, so `spawn_workout` moves it onto tokio's blocking pool and
//     hands back a handle to cancel or await it.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::core_modules::detector::RepDetector;
use crate::core_modules::feedback::FeedbackSink;
use crate::core_modules::high_knee::HighKneeDetector;
use crate::core_modules::lunge::LungeDetector;
use crate::error::{RepVisionError, Result};
use crate::exercise::{DetectorProfile, Exercise};
use crate::pipeline::{FrameReport, LiveFrame, LivePipeline};
use crate::workout::{cancellation, CancelHandle, FrameSource, WorkoutOutcome, WorkoutRunner};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user: String,
    pub exercise: Exercise,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, exercise: Exercise) -> Self {
        Self {
            user: user.into(),
            exercise,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.exercise)
    }
}

/// A live session for whichever detector family the profile selected.
pub enum LiveSession {
    HighKnees(LivePipeline<HighKneeDetector>),
    Lunge(LivePipeline<LungeDetector>),
}

impl LiveSession {
    pub fn new(profile: DetectorProfile, config: SessionConfig) -> Result<Self> {
        Ok(match profile {
            DetectorProfile::HighKnees(profile) => {
                LiveSession::HighKnees(LivePipeline::new(HighKneeDetector::new(profile)?, config)?)
            }
            DetectorProfile::Lunge(profile) => {
                LiveSession::Lunge(LivePipeline::new(LungeDetector::new(profile)?, config)?)
            }
        })
    }

    pub fn process_frame(&mut self, frame: LiveFrame) -> FrameReport {
        match self {
            LiveSession::HighKnees(pipeline) => pipeline.process_frame(frame),
            LiveSession::Lunge(pipeline) => pipeline.process_frame(frame),
        }
    }
}

type SharedSession = Arc<Mutex<LiveSession>>;

/// All live sessions of one host.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the session for `key`. Invalid configuration fails here,
    /// before any frame is processed.
    pub async fn start_session(
        &self,
        key: SessionKey,
        profile: DetectorProfile,
        config: SessionConfig,
    ) -> Result<()> {
        if profile.exercise() != key.exercise {
            return Err(RepVisionError::config(format!(
                "profile for {} cannot drive session {key}",
                profile.exercise()
            )));
        }
        let session = LiveSession::new(profile, config)?;
        let replaced = self
            .sessions
            .write()
            .await
            .insert(key.clone(), Arc::new(Mutex::new(session)))
            .is_some();
        info!(session = %key, replaced, "session started");
        Ok(())
    }

    pub async fn process(&self, key: &SessionKey, frame: LiveFrame) -> Result<FrameReport> {
        let session = self.session(key).await?;
        let mut session = session.lock().await;
        Ok(session.process_frame(frame))
    }

    /// Processes frames of possibly many sessions concurrently. Results come back in
    /// input order.
    pub async fn process_batch(
        &self,
        frames: Vec<(SessionKey, LiveFrame)>,
    ) -> Vec<Result<FrameReport>> {
        debug!(frames = frames.len(), "processing batch");
        let tasks = frames
            .into_iter()
            .map(|(key, frame)| async move { self.process(&key, frame).await });
        join_all(tasks).await
    }

    /// Discards the session state. Returns whether a session existed.
    pub async fn end_session(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.write().await.remove(key).is_some();
        if removed {
            info!(session = %key, "session ended");
        }
        removed
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, key: &SessionKey) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| RepVisionError::UnknownSession { key: key.to_string() })
    }
}

/// A blocking workout running on tokio's blocking pool.
pub struct WorkoutHandle {
    cancel: CancelHandle,
    join: JoinHandle<WorkoutOutcome>,
}

impl WorkoutHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn outcome(self) -> Result<WorkoutOutcome> {
        self.join
            .await
            .map_err(|err| RepVisionError::Worker(err.to_string()))
    }
}

/// Runs `runner` to completion on a dedicated blocking worker.
pub fn spawn_workout<D, S, F>(runner: WorkoutRunner<D>, mut source: S, mut sink: F) -> WorkoutHandle
where
    D: RepDetector + Send + 'static,
    S: FrameSource + Send + 'static,
    F: FeedbackSink + Send + 'static,
{
    let (cancel, token) = cancellation();
    let join = tokio::task::spawn_blocking(move || runner.run(&mut source, &mut sink, &token));
    WorkoutHandle { cancel, join }
}
