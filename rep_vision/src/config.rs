// THEORY:
// `SessionConfig` is the per-session contract between a client and the lifecycle
// controllers: how many reps make a set, how many sets make the exercise, and how
// long to rest in between. It is validated once, at session setup, so that the
// per-frame paths never have to handle a malformed plan.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RepVisionError, Result};

pub const DEFAULT_TARGET_REPS: u32 = 10;
pub const DEFAULT_TOTAL_SETS: u32 = 2;
pub const DEFAULT_REST_SECONDS: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reps that complete one set.
    pub target_reps_per_set: u32,
    /// Sets that complete the exercise.
    pub total_sets: u32,
    /// Rest between consecutive sets.
    pub rest_duration_seconds: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_reps_per_set: DEFAULT_TARGET_REPS,
            total_sets: DEFAULT_TOTAL_SETS,
            rest_duration_seconds: DEFAULT_REST_SECONDS,
        }
    }
}

impl SessionConfig {
    pub fn new(target_reps_per_set: u32, total_sets: u32, rest_duration_seconds: f64) -> Self {
        Self {
            target_reps_per_set,
            total_sets,
            rest_duration_seconds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_reps_per_set == 0 {
            return Err(RepVisionError::config("target_reps_per_set must be at least 1"));
        }
        if self.total_sets == 0 {
            return Err(RepVisionError::config("total_sets must be at least 1"));
        }
        self.rest_duration()?;
        Ok(())
    }

    pub fn rest_duration(&self) -> Result<Duration> {
        seconds("rest_duration_seconds", self.rest_duration_seconds)
    }
}

/// Converts a configured number of seconds, rejecting values that are negative,
/// non-finite or too large for a `Duration`.
pub fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|err| {
        RepVisionError::config(format!(
            "{field} must be a non-negative number of seconds, got {value} ({err})"
        ))
    })
}
