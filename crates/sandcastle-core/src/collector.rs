//! Result collection from finished sandboxes

use crate::sandbox::{SandboxInstance, SandboxState};
use crate::{ExecutionResult, Outcome, Result, SandcastleError};

const MIB: u64 = 1024 * 1024;

/// Strip control characters and surrounding whitespace from captured output.
///
/// Newlines and tabs are kept; every other C0 control and DEL is dropped.
/// Applying it twice gives the same string as applying it once.
#[must_use]
pub fn sanitize_output(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !(c.is_ascii_control()))
        .collect();
    cleaned.trim().to_string()
}

/// Bytes to whole megabytes, rounded to nearest
#[must_use]
pub const fn bytes_to_mb(bytes: u64) -> u64 {
    bytes.saturating_add(MIB / 2) / MIB
}

/// Read output, elapsed time and peak memory from a finished sandbox.
///
/// Must run before the instance is removed; stats are gone afterwards.
pub async fn collect(instance: &SandboxInstance, memory_limit_mb: u64) -> Result<ExecutionResult> {
    let state = instance.state();
    let outcome = match state {
        SandboxState::Completed => Outcome::Completed,
        SandboxState::Crashed => Outcome::Crashed,
        other => {
            return Err(SandcastleError::runtime(
                "collect",
                format!("cannot collect from a sandbox in state {other:?}"),
            ));
        }
    };

    let runtime = instance.runtime();
    let logs = runtime.logs(instance.id()).await?;
    let usage = runtime.stats(instance.id()).await?;

    Ok(ExecutionResult {
        output: sanitize_output(&String::from_utf8_lossy(&logs)),
        elapsed: instance.elapsed(),
        peak_memory_mb: bytes_to_mb(usage.peak_bytes()),
        memory_limit_mb,
        exit_code: instance.exit_status().map(|status| status.code),
        outcome,
    })
}
