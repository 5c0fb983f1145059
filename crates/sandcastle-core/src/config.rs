//! Sandbox configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Soft/hard pair for a container ulimit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    pub soft: i64,
    pub hard: i64,
}

/// Resource ceiling applied to every sandbox container.
///
/// These are deployment-wide; nothing in a request can change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes (swap is disabled at the same value)
    pub memory_bytes: u64,

    /// CFS quota in microseconds per `cpu_period_us`
    pub cpu_quota_us: i64,

    /// CFS period in microseconds
    pub cpu_period_us: i64,

    /// Maximum number of processes/threads inside the container
    pub pids_limit: i64,

    /// CPU-time ulimit in seconds
    pub cpu_time: Ulimit,

    /// Open file descriptor ulimit
    pub open_files: Ulimit,

    /// Allow network access
    pub allow_network: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * MIB,
            cpu_quota_us: 50_000,
            cpu_period_us: 100_000,
            pids_limit: 64,
            cpu_time: Ulimit { soft: 50, hard: 100 },
            open_files: Ulimit { soft: 50, hard: 100 },
            allow_network: false,
        }
    }
}

impl ResourceLimits {
    #[must_use]
    pub const fn memory_limit_mb(&self) -> u64 {
        self.memory_bytes / MIB
    }
}

/// Configuration for the sandbox orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Image every sandbox container is created from
    pub image: String,

    /// Directory holding the Dockerfile used when the image is missing
    pub build_context: PathBuf,

    /// Resource ceiling for each container
    pub limits: ResourceLimits,

    /// Maximum wall-clock execution time
    pub timeout: Duration,

    /// Grace period given to a timed-out container before it is killed
    pub stop_grace: Duration,

    /// Parent directory for per-request workspaces (system temp dir if unset)
    pub workspace_root: Option<PathBuf>,

    /// Leave workspaces on disk after the request finishes
    pub keep_workspaces: bool,

    /// Serialize image builds so concurrent first requests build only once
    pub single_flight_builds: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "code-sandbox".into(),
            build_context: PathBuf::from("docker"),
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(1),
            workspace_root: None,
            keep_workspaces: false,
            single_flight_builds: false,
        }
    }
}

impl SandboxConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Check the values that would make every execution fail.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::SandcastleError;

        if self.image.trim().is_empty() {
            return Err(SandcastleError::Config("image name is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(SandcastleError::Config("timeout must be non-zero".into()));
        }
        if self.limits.memory_bytes < 6 * MIB {
            // Docker refuses anything below 6MB
            return Err(SandcastleError::Config("memory limit below 6MB".into()));
        }
        if self.limits.cpu_quota_us <= 0 || self.limits.cpu_period_us <= 0 {
            return Err(SandcastleError::Config("cpu quota/period must be positive".into()));
        }
        Ok(())
    }
}

/// Builder for SandboxConfig
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    config: SandboxConfig,
}

impl SandboxConfigBuilder {
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    #[must_use]
    pub fn build_context(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.build_context = path.into();
        self
    }

    #[must_use]
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.config.limits.memory_bytes = bytes;
        self
    }

    #[must_use]
    pub fn memory_limit_mb(self, mb: u64) -> Self {
        self.memory_limit(mb * MIB)
    }

    /// CPU share as a percentage of one core
    #[must_use]
    pub fn cpu_limit(mut self, percent: u32) -> Self {
        let percent = i64::from(percent.clamp(1, 100));
        self.config.limits.cpu_quota_us = self.config.limits.cpu_period_us * percent / 100;
        self
    }

    #[must_use]
    pub fn pids_limit(mut self, pids: i64) -> Self {
        self.config.limits.pids_limit = pids;
        self
    }

    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = duration;
        self
    }

    #[must_use]
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    #[must_use]
    pub fn stop_grace(mut self, duration: Duration) -> Self {
        self.config.stop_grace = duration;
        self
    }

    #[must_use]
    pub fn allow_network(mut self, allow: bool) -> Self {
        self.config.limits.allow_network = allow;
        self
    }

    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(path.into());
        self
    }

    #[must_use]
    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.config.keep_workspaces = keep;
        self
    }

    #[must_use]
    pub fn single_flight_builds(mut self, enabled: bool) -> Self {
        self.config.single_flight_builds = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> SandboxConfig {
        self.config
    }
}

/// Get default daemon address from SANDCASTLE_ADDR env var or the built-in default
///
/// Returns:
/// - `$SANDCASTLE_ADDR` if set
/// - `127.0.0.1:8080` otherwise
pub fn default_daemon_addr() -> String {
    std::env::var("SANDCASTLE_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into())
}
