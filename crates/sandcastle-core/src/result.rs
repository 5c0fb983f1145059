//! Execution result types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal classification of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// The program exited on its own
    Completed,
    /// The wall-clock limit fired first.
    ///
    /// [`Orchestrator::execute`](crate::Orchestrator::execute) reports a
    /// timeout as [`SandcastleError::Timeout`](crate::SandcastleError::Timeout)
    /// and never builds a result with this outcome; it exists so clients
    /// decoding the wire format can name every terminal state.
    TimedOut,
    /// The program was killed by a resource ceiling or a signal
    Crashed,
}

/// Result of a sandboxed code execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Combined stdout/stderr, control characters stripped
    pub output: String,

    /// Wall time from container start to observed termination
    pub elapsed: Duration,

    /// Peak memory usage in whole megabytes
    pub peak_memory_mb: u64,

    /// Memory ceiling the container ran under, in megabytes
    pub memory_limit_mb: u64,

    /// Exit status reported by the runtime, if the program exited
    pub exit_code: Option<i64>,

    pub outcome: Outcome,
}

impl ExecutionResult {
    #[must_use]
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }

    /// `"<used>MB / <ceiling>MB"`
    #[must_use]
    pub fn memory_usage(&self) -> String {
        format!("{}MB / {}MB", self.peak_memory_mb, self.memory_limit_mb)
    }

    /// Check if execution was successful (exit code 0, ran to completion)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Completed && self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_use_camel_case_names() {
        assert_eq!(serde_json::to_string(&Outcome::Completed).unwrap(), r#""completed""#);
        assert_eq!(serde_json::to_string(&Outcome::TimedOut).unwrap(), r#""timedOut""#);
        assert_eq!(
            serde_json::from_str::<Outcome>(r#""timedOut""#).unwrap(),
            Outcome::TimedOut
        );
    }
}
