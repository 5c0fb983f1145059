//! Request orchestration
//!
//! Registry -> workspace -> image -> sandbox -> collector, strictly in that
//! order for each request. The runtime client is injected once and shared by
//! every request; nothing else is shared between them.

use crate::collector;
use crate::image::ImageGuard;
use crate::language::Language;
use crate::protocol::ExecuteRequest;
use crate::runtime::ContainerRuntime;
use crate::sandbox::{self, SandboxInstance, Termination};
use crate::workspace::Workspace;
use crate::{ExecutionResult, Result, SandboxConfig, SandcastleError};
use std::sync::Arc;

pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageGuard,
    config: SandboxConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            images: ImageGuard::from_config(&config),
            runtime,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Build the sandbox image now instead of on the first request.
    pub async fn prepare(&self) -> Result<()> {
        self.images.ensure(self.runtime.as_ref()).await
    }

    /// Run one submission to completion.
    ///
    /// Whatever happens after the container is created, it is removed before
    /// this returns, and the workspace is deleted (unless retention is on).
    /// A timeout is reported as [`SandcastleError::Timeout`].
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult> {
        let language: Language = request.language.parse()?;
        let profile = language.profile();

        let mut workspace =
            Workspace::provision(self.config.workspace_root.as_deref(), &request.code, profile)?;
        if self.config.keep_workspaces {
            workspace.retain();
        }

        self.images.ensure(self.runtime.as_ref()).await?;

        let spec = sandbox::container_spec(&self.config, profile, &workspace);
        let instance = SandboxInstance::create(Arc::clone(&self.runtime), &spec).await?;

        let result = self.supervise(&instance).await;

        if let Err(e) = instance.remove().await {
            tracing::warn!(container_id = instance.id(), error = %e, "failed to remove sandbox");
        }

        match &result {
            Ok(res) => tracing::info!(
                %language,
                outcome = ?res.outcome,
                elapsed_ms = u64::try_from(res.elapsed_millis()).unwrap_or(u64::MAX),
                peak_memory_mb = res.peak_memory_mb,
                "execution finished"
            ),
            Err(SandcastleError::Timeout { .. }) => {
                tracing::info!(%language, "execution timed out");
            }
            Err(e) => tracing::error!(%language, error = %e, "execution failed"),
        }

        result
    }

    async fn supervise(&self, instance: &SandboxInstance) -> Result<ExecutionResult> {
        instance.start().await?;

        match instance
            .await_outcome(self.config.timeout, self.config.stop_grace)
            .await?
        {
            Termination::TimedOut => Err(SandcastleError::Timeout {
                limit: self.config.timeout,
            }),
            Termination::Exited(_) => {
                collector::collect(instance, self.config.limits.memory_limit_mb()).await
            }
        }
    }
}
