//! Docker Engine backend for [`ContainerRuntime`]

use crate::runtime::{ContainerRuntime, ContainerSpec, ExitStatus, UsageSnapshot};
use crate::{Result, SandcastleError};
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig, ResourcesUlimits};
use bollard::query_parameters::{
    BuildImageOptions, CreateContainerOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest build log tail kept in an [`SandcastleError::ImageBuild`]
const BUILD_LOG_TAIL: usize = 2048;

/// Container runtime backed by the local Docker daemon.
///
/// Create one per process and share it; the underlying client is cheap to
/// clone and safe to use concurrently.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandcastleError::runtime("connect", e.to_string()))?;
        Ok(Self { docker })
    }

    #[must_use]
    pub const fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn runtime_err(op: &'static str) -> impl FnOnce(BollardError) -> SandcastleError {
    move |e| SandcastleError::runtime(op, e.to_string())
}

/// 304 (already stopped) and 404 (already gone)
fn is_already_done(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304 | 404,
            ..
        }
    )
}

fn host_config(spec: &ContainerSpec) -> HostConfig {
    let limits = &spec.limits;
    let memory = i64::try_from(limits.memory_bytes).unwrap_or(i64::MAX);

    HostConfig {
        memory: Some(memory),
        // equal to memory: no swap on top of the ceiling
        memory_swap: Some(memory),
        cpu_quota: Some(limits.cpu_quota_us),
        cpu_period: Some(limits.cpu_period_us),
        pids_limit: Some(limits.pids_limit),
        network_mode: Some(if limits.allow_network { "bridge" } else { "none" }.into()),
        binds: Some(spec.binds.iter().map(crate::runtime::Bind::to_spec).collect()),
        ulimits: Some(vec![
            ResourcesUlimits {
                name: Some("cpu".into()),
                soft: Some(limits.cpu_time.soft),
                hard: Some(limits.cpu_time.hard),
            },
            ResourcesUlimits {
                name: Some("nofile".into()),
                soft: Some(limits.open_files.soft),
                hard: Some(limits.open_files.hard),
            },
        ]),
        cap_drop: Some(vec!["ALL".into()]),
        security_opt: Some(vec!["no-new-privileges".into()]),
        ..Default::default()
    }
}

fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        network_disabled: Some(!spec.limits.allow_network),
        stop_timeout: Some(i64::try_from(spec.stop_timeout.as_secs()).unwrap_or(1)),
        host_config: Some(host_config(spec)),
        ..Default::default()
    }
}

/// Pack a build context directory into an in-memory tar archive
fn pack_context(context: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);
    archive.append_dir_all(".", context)?;
    archive.into_inner()
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();
    let start = text.len().saturating_sub(BUILD_LOG_TAIL);
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(runtime_err("ping"))?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(SandcastleError::runtime("inspect_image", e.to_string())),
        }
    }

    async fn build_image(&self, image: &str, context: &Path) -> Result<()> {
        if !context.join("Dockerfile").is_file() {
            return Err(SandcastleError::ImageBuild(format!(
                "no Dockerfile in build context {}",
                context.display()
            )));
        }

        tracing::info!(image, context = %context.display(), "building sandbox image");

        let dir: PathBuf = context.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_context(&dir))
            .await
            .map_err(|e| SandcastleError::ImageBuild(format!("packing build context: {e}")))?
            .map_err(|e| SandcastleError::ImageBuild(format!("packing build context: {e}")))?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".into(),
            t: Some(image.to_string()),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(bollard::body_full(archive.into())));
        let mut log = Vec::new();

        while let Some(step) = stream.next().await {
            let info = match step {
                Ok(info) => info,
                Err(e) => {
                    return Err(SandcastleError::ImageBuild(format!(
                        "{e}: {}",
                        tail(&log)
                    )));
                }
            };
            if let Some(text) = info.stream {
                log.extend_from_slice(text.as_bytes());
            }
            if let Some(error) = info.error {
                return Err(SandcastleError::ImageBuild(format!(
                    "{error}: {}",
                    tail(&log)
                )));
            }
        }

        tracing::info!(image, "sandbox image built");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let options = Some(CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let response = self
            .docker
            .create_container(options, create_body(spec))
            .await
            .map_err(runtime_err("create"))?;

        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, %warning, "runtime warning on create");
        }

        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(runtime_err("start"))
    }

    async fn wait(&self, id: &str) -> Result<ExitStatus> {
        let mut stream = self.docker.wait_container(id, None::<WaitContainerOptions>);

        let code = match stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(SandcastleError::runtime("wait", e.to_string())),
            None => {
                return Err(SandcastleError::runtime(
                    "wait",
                    "wait stream ended without a status",
                ));
            }
        };

        let oom_killed = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(runtime_err("inspect"))?
            .state
            .and_then(|state| state.oom_killed)
            .unwrap_or(false);

        Ok(ExitStatus { code, oom_killed })
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: Some(i32::try_from(grace.as_secs()).unwrap_or(1)),
            ..Default::default()
        };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => {
                tracing::debug!(container_id = id, "stop was a no-op");
                Ok(())
            }
            Err(e) => Err(SandcastleError::runtime("stop", e.to_string())),
        }
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let options = Some(LogsOptions {
            stdout: true,
            stderr: true,
            ..Default::default()
        });

        let mut stream = self.docker.logs(id, options);
        let mut combined = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(runtime_err("logs"))? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => combined.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(combined)
    }

    async fn stats(&self, id: &str) -> Result<UsageSnapshot> {
        let options = Some(StatsOptions {
            stream: false,
            ..Default::default()
        });

        let mut stream = self.docker.stats(id, options);
        let stats = match stream.next().await {
            Some(stats) => stats.map_err(runtime_err("stats"))?,
            None => return Ok(UsageSnapshot::default()),
        };

        Ok(stats
            .memory_stats
            .map(|memory| UsageSnapshot {
                memory_usage_bytes: memory.usage,
                memory_peak_bytes: memory.max_usage,
            })
            .unwrap_or_default())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => Ok(()),
            Err(e) => Err(SandcastleError::runtime("remove", e.to_string())),
        }
    }
}
