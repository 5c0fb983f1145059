//! Sandbox lifecycle
//!
//! One [`SandboxInstance`] per request, moving through
//! `Created -> Running -> {Completed | TimedOut | Crashed} -> Removed`.
//! Every transition is a check-and-set on the instance's lifecycle lock, so
//! a branch that lost a race can never act on a container another branch
//! already finished with.

use crate::language::LanguageProfile;
use crate::runtime::{ContainerRuntime, ContainerSpec, ExitStatus};
use crate::workspace::Workspace;
use crate::{Result, SandboxConfig, SandcastleError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extra time a stop call gets beyond the container's own grace period
pub const STOP_SLACK: Duration = Duration::from_secs(5);

/// Longest a caller waits on a forced removal; the removal itself keeps
/// running in the background past this point.
pub const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Container exists but has not been started
    Created,
    /// Program is executing
    Running,
    /// Program exited on its own
    Completed,
    /// Wall-clock limit fired before the program exited
    TimedOut,
    /// Program was killed by a ceiling or a signal
    Crashed,
    /// Container has been removed
    Removed,
}

impl SandboxState {
    /// States in which logs and stats are complete
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Crashed)
    }
}

/// How the race between the program and the timeout ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
}

#[derive(Debug)]
struct Lifecycle {
    state: SandboxState,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    exit: Option<ExitStatus>,
}

/// Build the container description for one request.
///
/// Only the command and the mount depend on the request; the ceiling comes
/// from configuration and is the same for every submission.
#[must_use]
pub fn container_spec(
    config: &SandboxConfig,
    profile: &LanguageProfile,
    workspace: &Workspace,
) -> ContainerSpec {
    ContainerSpec {
        name: format!("sandcastle-{}", uuid::Uuid::new_v4()),
        image: config.image.clone(),
        command: profile.command_line(),
        binds: vec![workspace.mount()],
        limits: config.limits.clone(),
        stop_timeout: config.stop_grace,
    }
}

pub struct SandboxInstance {
    id: String,
    runtime: Arc<dyn ContainerRuntime>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SandboxInstance {
    pub async fn create(runtime: Arc<dyn ContainerRuntime>, spec: &ContainerSpec) -> Result<Self> {
        let id = runtime.create(spec).await?;
        tracing::debug!(container_id = %id, name = %spec.name, "sandbox created");

        Ok(Self {
            id,
            runtime,
            lifecycle: Mutex::new(Lifecycle {
                state: SandboxState::Created,
                started_at: None,
                finished_at: None,
                exit: None,
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> SandboxState {
        self.lifecycle.lock().state
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.lifecycle.lock().exit
    }

    /// Wall time from start to observed termination (or to now while running)
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let lifecycle = self.lifecycle.lock();
        match (lifecycle.started_at, lifecycle.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Move `from -> to` only if the instance is currently in `from`.
    fn transition(&self, from: SandboxState, to: SandboxState) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != from {
            return false;
        }
        lifecycle.state = to;
        if to != SandboxState::Running {
            lifecycle.finished_at = Some(Instant::now());
        }
        true
    }

    pub async fn start(&self) -> Result<()> {
        if self.state() != SandboxState::Created {
            return Err(SandcastleError::runtime("start", "sandbox already started"));
        }

        self.runtime.start(&self.id).await?;

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = SandboxState::Running;
        lifecycle.started_at = Some(Instant::now());
        tracing::debug!(container_id = %self.id, "sandbox running");
        Ok(())
    }

    /// Race natural exit against `timeout`; whichever comes first wins.
    ///
    /// The losing future is dropped, so a finished program can never be
    /// stopped by a stale timer. On timeout the container is stopped here;
    /// a failing stop is logged and the timeout still stands. Removal is
    /// left to [`Self::remove`].
    pub async fn await_outcome(&self, timeout: Duration, grace: Duration) -> Result<Termination> {
        if self.state() != SandboxState::Running {
            return Err(SandcastleError::runtime("wait", "sandbox is not running"));
        }

        tokio::select! {
            exited = self.runtime.wait(&self.id) => {
                let status = exited?;
                let to = if status.oom_killed || status.signaled() {
                    SandboxState::Crashed
                } else {
                    SandboxState::Completed
                };

                if !self.transition(SandboxState::Running, to) {
                    return Err(SandcastleError::runtime("wait", "sandbox left the running state"));
                }
                self.lifecycle.lock().exit = Some(status);

                tracing::debug!(
                    container_id = %self.id,
                    exit_code = status.code,
                    oom_killed = status.oom_killed,
                    "sandbox exited"
                );
                Ok(Termination::Exited(status))
            }
            () = tokio::time::sleep(timeout) => {
                if self.transition(SandboxState::Running, SandboxState::TimedOut) {
                    tracing::info!(
                        container_id = %self.id,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "sandbox timed out, stopping"
                    );
                    let stop = self.runtime.stop(&self.id, grace);
                    match tokio::time::timeout(grace + STOP_SLACK, stop).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(container_id = %self.id, error = %e, "failed to stop timed-out sandbox");
                        }
                        Err(_) => {
                            tracing::warn!(container_id = %self.id, "stop of timed-out sandbox did not return");
                        }
                    }
                }
                Ok(Termination::TimedOut)
            }
        }
    }

    /// Remove the container. Only the first call reaches the runtime.
    ///
    /// Returns within [`REMOVE_TIMEOUT`]. A removal still pending by then is
    /// left running detached and reported as an error.
    pub async fn remove(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == SandboxState::Removed {
                return Ok(());
            }
            lifecycle.state = SandboxState::Removed;
        }

        let runtime = Arc::clone(&self.runtime);
        let id = self.id.clone();
        let task = tokio::spawn(async move { runtime.remove(&id).await });

        match tokio::time::timeout(REMOVE_TIMEOUT, task).await {
            Ok(Ok(removed)) => removed?,
            Ok(Err(e)) => return Err(SandcastleError::runtime("remove", e.to_string())),
            Err(_) => {
                tracing::warn!(container_id = %self.id, "removal still pending, continuing in background");
                return Err(SandcastleError::runtime(
                    "remove",
                    format!("not finished after {}s", REMOVE_TIMEOUT.as_secs()),
                ));
            }
        }

        tracing::debug!(container_id = %self.id, "sandbox removed");
        Ok(())
    }
}

impl Drop for SandboxInstance {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state == SandboxState::Removed {
            return;
        }
        self.lifecycle.get_mut().state = SandboxState::Removed;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(container_id = %self.id, "sandbox dropped outside a runtime, container leaked");
            return;
        };

        tracing::warn!(container_id = %self.id, "sandbox dropped before removal, removing in background");
        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            if let Err(e) = runtime.remove(&id).await {
                tracing::error!(container_id = %id, error = %e, "background removal failed");
            }
        });
    }
}
