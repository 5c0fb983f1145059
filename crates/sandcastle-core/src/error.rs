//! Error types for sandcastle-core

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandcastleError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("image build error: {0}")]
    ImageBuild(String),

    #[error("timeout after {} seconds", whole_secs(.limit))]
    Timeout { limit: Duration },

    #[error("container runtime error during {op}: {message}")]
    Runtime { op: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Seconds, rounded up so a sub-second limit never reads as zero
fn whole_secs(limit: &Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

impl SandcastleError {
    pub fn runtime(op: &'static str, message: impl Into<String>) -> Self {
        Self::Runtime {
            op,
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to at the service boundary.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnsupportedLanguage(_) => 400,
            Self::Timeout { .. } => 408,
            Self::Workspace(_) | Self::ImageBuild(_) | Self::Runtime { .. } | Self::Config(_) => {
                500
            }
        }
    }

    /// Message safe to hand back to the caller.
    ///
    /// Host paths, runtime responses and other internals stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::UnsupportedLanguage(lang) => format!("Unsupported language: {lang}"),
            Self::Timeout { limit } => {
                format!("Execution timed out ({} seconds limit).", whole_secs(limit))
            }
            Self::Workspace(_) | Self::ImageBuild(_) | Self::Runtime { .. } | Self::Config(_) => {
                "Internal error while executing code.".into()
            }
        }
    }
}
