//! Daemon configuration

use anyhow::Context;
use sandcastle_core::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Executions allowed to run at once; the rest wait for a slot
    pub max_concurrent: usize,

    /// Build the sandbox image at startup instead of on first use
    pub prebuild_image: bool,

    /// Sandbox configuration for every execution
    pub sandbox: SandboxConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: sandcastle_core::config::default_daemon_addr(),
            max_concurrent: 8,
            prebuild_image: true,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `$SANDCASTLE_CONFIG` (JSON) if set, then apply `$SANDCASTLE_ADDR`.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os("SANDCASTLE_CONFIG");
        let addr = std::env::var("SANDCASTLE_ADDR").ok();
        Self::load_from(path.as_deref().map(Path::new), addr)
    }

    pub fn load_from(path: Option<&Path>, addr_override: Option<String>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(addr) = addr_override {
            config.bind_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_concurrent > 0, "max_concurrent must be at least 1");
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid bind_addr {:?}", self.bind_addr))?;
        self.sandbox.validate()?;
        Ok(())
    }
}
