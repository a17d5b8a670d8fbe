// THEORY:
// Workout plans name exercises in free text ("High Knees", "Step-Back Lunge",
// "lunges"). `Exercise::from_name` normalizes such a name into a slug and maps it
// onto one of the detector families the engine implements. Everything else is
// rejected up front, before a session is created.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_modules::high_knee::HighKneeProfile;
use crate::core_modules::lunge::LungeProfile;
use crate::error::{RepVisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exercise {
    HighKnees,
    StepBackLunge,
}

impl Exercise {
    pub fn from_name(name: &str) -> Result<Self> {
        match normalize_name(name).as_str() {
            "high-knees" | "high-knee" => Ok(Exercise::HighKnees),
            "lunges" | "lunge" | "step-back-lunge" | "step-back-lunges" => {
                Ok(Exercise::StepBackLunge)
            }
            _ => Err(RepVisionError::UnsupportedExercise {
                name: name.to_string(),
            }),
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Exercise::HighKnees => "high-knees",
            Exercise::StepBackLunge => "step-back-lunge",
        }
    }

    /// Thresholds for the incremental (push) path.
    pub fn live_profile(&self) -> DetectorProfile {
        match self {
            Exercise::HighKnees => DetectorProfile::HighKnees(HighKneeProfile::live()),
            Exercise::StepBackLunge => DetectorProfile::Lunge(LungeProfile::step_back()),
        }
    }

    /// Thresholds for the blocking (camera loop) path.
    pub fn camera_profile(&self) -> DetectorProfile {
        match self {
            Exercise::HighKnees => DetectorProfile::HighKnees(HighKneeProfile::camera()),
            Exercise::StepBackLunge => DetectorProfile::Lunge(LungeProfile::step_back()),
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Keeps word characters, whitespace and `()-`, then trims, lowercases and joins
/// words with `-`.
pub fn normalize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| {
            c.is_alphanumeric() || *c == '_' || c.is_whitespace() || matches!(c, '(' | ')' | '-')
        })
        .collect();
    kept.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// A detector family together with its thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "exercise", rename_all = "kebab-case")]
pub enum DetectorProfile {
    HighKnees(HighKneeProfile),
    Lunge(LungeProfile),
}

impl DetectorProfile {
    pub fn exercise(&self) -> Exercise {
        match self {
            DetectorProfile::HighKnees(_) => Exercise::HighKnees,
            DetectorProfile::Lunge(_) => Exercise::StepBackLunge,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DetectorProfile::HighKnees(profile) => profile.validate(),
            DetectorProfile::Lunge(profile) => profile.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_names_normalize_to_slugs() {
        assert_eq!(normalize_name("  High Knees! "), "high-knees");
        assert_eq!(normalize_name("Step-Back Lunge (alt.)"), "step-back-lunge-(alt)");
        assert_eq!(normalize_name("Lunges"), "lunges");
    }

    #[test]
    fn known_names_map_to_detectors() {
        assert_eq!(Exercise::from_name("High Knees").unwrap(), Exercise::HighKnees);
        assert_eq!(Exercise::from_name("Lunges").unwrap(), Exercise::StepBackLunge);
        assert_eq!(Exercise::from_name("Step-Back Lunge").unwrap(), Exercise::StepBackLunge);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = Exercise::from_name("Burpees").unwrap_err();
        assert!(matches!(
            err,
            RepVisionError::UnsupportedExercise { ref name } if name == "Burpees"
        ));
    }

    #[test]
    fn profiles_differ_by_path() {
        let live = Exercise::HighKnees.live_profile();
        let camera = Exercise::HighKnees.camera_profile();
        assert_ne!(live, camera);
        assert_eq!(live.exercise(), Exercise::HighKnees);
        assert!(camera.validate().is_ok());
    }

    #[test]
    fn profiles_deserialize_from_tagged_json() {
        let profile: DetectorProfile =
            serde_json::from_str(r#"{"exercise": "lunge", "entry_angle": 110.0}"#).unwrap();
        match profile {
            DetectorProfile::Lunge(lunge) => {
                assert_eq!(lunge.entry_angle, 110.0);
                assert_eq!(lunge.exit_angle, 125.0);
            }
            other => panic!("unexpected profile {other:?}"),
        }
    }
}
