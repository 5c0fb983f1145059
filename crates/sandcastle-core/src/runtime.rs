//! Container runtime seam
//!
//! The orchestrator drives containers only through [`ContainerRuntime`].
//! [`crate::docker::DockerRuntime`] is the production implementation.

use crate::{config::ResourceLimits, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host path bound into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Bind {
    /// `host:container[:ro]`, the form the Docker API expects
    #[must_use]
    pub fn to_spec(&self) -> String {
        let mut spec = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            spec.push_str(":ro");
        }
        spec
    }
}

/// Everything needed to create one sandbox container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub binds: Vec<Bind>,
    pub limits: ResourceLimits,
    /// Seconds the runtime waits after SIGTERM before SIGKILL
    pub stop_timeout: Duration,
}

/// Highest signal number on Linux (`SIGRTMAX`)
const MAX_SIGNAL: i64 = 64;

/// How a container exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
    pub oom_killed: bool,
}

impl ExitStatus {
    /// Killed by a signal (shell convention `128 + signo`, signals 1..=64).
    ///
    /// Codes above that range are ordinary exits chosen by the program.
    #[must_use]
    pub const fn signaled(&self) -> bool {
        self.code > 128 && self.code <= 128 + MAX_SIGNAL
    }
}

/// Point-in-time resource accounting for a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub memory_usage_bytes: Option<u64>,
    pub memory_peak_bytes: Option<u64>,
}

impl UsageSnapshot {
    #[must_use]
    pub fn peak_bytes(&self) -> u64 {
        self.memory_peak_bytes
            .or(self.memory_usage_bytes)
            .unwrap_or(0)
    }
}

/// Operations the orchestrator needs from a container runtime.
///
/// `stop` and `remove` must treat an already stopped or already removed
/// container as success.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn build_image(&self, image: &str, context: &Path) -> Result<()>;

    /// Create a container and return its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    /// Resolve once the container is no longer running
    async fn wait(&self, id: &str) -> Result<ExitStatus>;

    async fn stop(&self, id: &str, grace: Duration) -> Result<()>;

    /// Combined stdout/stderr in arrival order
    async fn logs(&self, id: &str) -> Result<Vec<u8>>;

    async fn stats(&self, id: &str) -> Result<UsageSnapshot>;

    /// Force-remove the container
    async fn remove(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_bind_spec() {
        let bind = Bind {
            host: PathBuf::from("/tmp/sandcastle-abc/main.py"),
            container: "/app/main.py".into(),
            read_only: true,
        };
        assert_eq!(bind.to_spec(), "/tmp/sandcastle-abc/main.py:/app/main.py:ro");
    }

    #[test]
    fn peak_falls_back_to_current_usage() {
        let snapshot = UsageSnapshot {
            memory_usage_bytes: Some(10),
            memory_peak_bytes: None,
        };
        assert_eq!(snapshot.peak_bytes(), 10);
        assert_eq!(UsageSnapshot::default().peak_bytes(), 0);
    }

    #[test]
    fn sigkill_counts_as_signaled() {
        assert!(ExitStatus { code: 137, oom_killed: false }.signaled());
        assert!(!ExitStatus { code: 1, oom_killed: false }.signaled());
    }

    #[test]
    fn high_exit_codes_are_not_signals() {
        assert!(ExitStatus { code: 192, oom_killed: false }.signaled());
        assert!(!ExitStatus { code: 193, oom_killed: false }.signaled());
        assert!(!ExitStatus { code: 200, oom_killed: false }.signaled());
        assert!(!ExitStatus { code: 255, oom_killed: false }.signaled());
        assert!(!ExitStatus { code: 128, oom_killed: false }.signaled());
    }
}
