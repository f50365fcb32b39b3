//! Error types for podsmith.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodsmithError {
    #[error("Invalid brief: {0}")]
    Validation(String),

    #[error("Stage {stage} failed: {message}")]
    Agent { stage: String, message: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PodsmithError {
    /// Stage error with the originating pipeline stage attached.
    pub fn agent(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// The stable, client-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Agent { .. } => ErrorKind::Agent,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Audio(_) => ErrorKind::Audio,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) | Self::Config(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Stable error kinds surfaced through the job API. Never carries
/// implementation type names or stack traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Agent,
    Backend,
    Audio,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Agent => "agent",
            Self::Backend => "backend",
            Self::Audio => "audio",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, PodsmithError>;
