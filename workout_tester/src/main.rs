mod config;
mod recording;

use anyhow::{Context, Result};
use rep_vision::pipeline::REST_COMPLETED;
use rep_vision::{
    spawn_workout, DetectorProfile, FrameReport, HighKneeDetector, LiveFrame, LogSink,
    LungeDetector, PoseFrame, RecordedFrames, SessionKey, SessionRegistry, WorkoutHandle,
    WorkoutOutcome, WorkoutRunner,
};
use std::env;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::TesterConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().skip(1).collect();
    let live = args.iter().any(|arg| arg == "--live");
    let positional: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();
    let Some(recording_path) = positional.first() else {
        println!("Usage: workout_tester <recording.jsonl> [config.toml] [--live]");
        return Ok(());
    };
    let config = match positional.get(1) {
        Some(path) if Path::new(path.as_str()).exists() => TesterConfig::load(path)?,
        Some(path) => {
            let config = TesterConfig::default();
            config.save(path)?;
            info!(path = %path, "wrote default config");
            config
        }
        None => TesterConfig::default(),
    };
    let profile = config.profile(live)?;

    // --- 2. Recording Replay ---
    let frames = recording::load(recording_path, Instant::now())?;
    info!(frames = frames.len(), exercise = %profile.exercise(), live, "replaying recording");

    // --- 3. Run ---
    if live {
        let report = run_live(&config, profile, frames).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let outcome = run_blocking(&config, profile, frames).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

/// Pushes every frame through a live session, advancing the set index whenever a
/// rest period ends. Returns the last report.
async fn run_live(
    config: &TesterConfig,
    profile: DetectorProfile,
    frames: Vec<PoseFrame>,
) -> Result<Option<FrameReport>> {
    let registry = SessionRegistry::new();
    let key = SessionKey::new("replay", profile.exercise());
    registry.start_session(key.clone(), profile, config.session.clone()).await?;

    let mut current_set = 1;
    let mut last = None;
    for frame in frames {
        let report = registry.process(&key, LiveFrame::new(frame, current_set)).await?;
        if report.rep_detected || report.feedback == REST_COMPLETED {
            info!(
                set = report.current_set,
                reps = report.rep_count,
                total = report.total_reps,
                feedback = %report.feedback,
                "frame"
            );
        }
        if report.feedback == REST_COMPLETED {
            current_set += 1;
        }
        let finished = report.workout_completed;
        last = Some(report);
        if finished {
            break;
        }
    }
    registry.end_session(&key).await;
    Ok(last)
}

/// Runs the blocking workout on a worker; ctrl-c cancels it.
async fn run_blocking(
    config: &TesterConfig,
    profile: DetectorProfile,
    frames: Vec<PoseFrame>,
) -> Result<WorkoutOutcome> {
    let source = RecordedFrames::new(frames);
    let session = config.session.clone();
    let handle: WorkoutHandle = match profile {
        DetectorProfile::HighKnees(profile) => {
            let runner = WorkoutRunner::new(HighKneeDetector::new(profile)?, session)?;
            spawn_workout(runner, source, LogSink)
        }
        DetectorProfile::Lunge(profile) => {
            let runner = WorkoutRunner::new(LungeDetector::new(profile)?, session)?;
            spawn_workout(runner, source, LogSink)
        }
    };

    let canceller = handle.canceller();
    let outcome = handle.outcome();
    tokio::pin!(outcome);
    let outcome = tokio::select! {
        result = &mut outcome => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            warn!("interrupted, cancelling workout");
            canceller.cancel();
            outcome.await
        }
    }?;
    Ok(outcome)
}
