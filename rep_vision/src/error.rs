use thiserror::Error;

/// Everything that can go wrong in the engine. Missing poses are not errors; they
/// are reported through detection feedback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepVisionError {
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    #[error("frame source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("unsupported exercise: {name}")]
    UnsupportedExercise { name: String },

    #[error("no active session for {key}")]
    UnknownSession { key: String },

    #[error("workout worker failed: {0}")]
    Worker(String),
}

impl RepVisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RepVisionError>;
