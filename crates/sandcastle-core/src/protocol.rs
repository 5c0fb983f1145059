//! Wire types shared by the daemon and the CLI

use crate::{ExecutionResult, Language, Outcome, Result, SandcastleError};
use serde::{Deserialize, Serialize};

/// Largest accepted submission
pub const MAX_CODE_BYTES: usize = 64 * 1024;

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }

    /// Shape checks done before anything touches the host.
    pub fn validate(&self) -> Result<Language> {
        if self.code.trim().is_empty() {
            return Err(SandcastleError::Validation("Code is required.".into()));
        }
        if self.code.len() > MAX_CODE_BYTES {
            return Err(SandcastleError::Validation(format!(
                "Code must be at most {MAX_CODE_BYTES} bytes."
            )));
        }
        self.language.parse::<Language>().map_err(|_| {
            let accepted: Vec<_> = Language::ALL.iter().map(|l| l.as_str()).collect();
            SandcastleError::Validation(format!(
                "Language must be one of: {}.",
                accepted.join(", ")
            ))
        })
    }
}

/// Successful execution, as returned to HTTP callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub output: String,
    /// `"<n>ms"`
    pub execution_time: String,
    /// `"<n>MB / <ceiling>MB"`
    pub memory_usage: String,
    pub outcome: Outcome,
}

impl From<&ExecutionResult> for ExecuteResponse {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            output: result.output.clone(),
            execution_time: format!("{}ms", result.elapsed_millis()),
            memory_usage: result.memory_usage(),
            outcome: result.outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&SandcastleError> for ErrorResponse {
    fn from(err: &SandcastleError) -> Self {
        Self {
            error: err.public_message(),
        }
    }
}

/// In-flight execution counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
