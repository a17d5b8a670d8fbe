use anyhow::{bail, Context, Result};
use rep_vision::{DetectorProfile, Exercise, SessionConfig};
use serde::{Deserialize, Serialize};
use std::fs;

/// Replay settings, loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    /// Exercise name as a workout plan would write it.
    pub exercise: String,
    pub session: SessionConfig,
    /// Overrides the built-in thresholds for the exercise.
    pub profile: Option<DetectorProfile>,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            exercise: "High Knees".to_string(),
            session: SessionConfig::default(),
            profile: None,
        }
    }
}

impl TesterConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        toml::from_str(&content).with_context(|| format!("parsing config {path}"))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing config {path}"))?;
        Ok(())
    }

    /// The detector thresholds to use: the override if present, otherwise the
    /// exercise's built-in profile for the chosen mode.
    pub fn profile(&self, live: bool) -> Result<DetectorProfile> {
        let exercise = Exercise::from_name(&self.exercise)?;
        let profile = match &self.profile {
            Some(profile) => profile.clone(),
            None if live => exercise.live_profile(),
            None => exercise.camera_profile(),
        };
        if profile.exercise() != exercise {
            bail!("profile is for {}, but the exercise is {exercise}", profile.exercise());
        }
        Ok(profile)
    }
}
