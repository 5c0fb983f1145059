//! sandcastled - HTTP front end for sandboxed code execution
//!
//! Accepts `POST /execute`, runs each submission in a fresh resource-capped
//! container and answers with its output, elapsed time and peak memory.

use anyhow::Result;
use futures_util::StreamExt;
use sandcastle_core::docker::DockerRuntime;
use sandcastle_core::{ContainerRuntime, Orchestrator};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod pool;
mod server;

use config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sandcastle=info".parse()?))
        .init();

    tracing::info!("sandcastled starting");

    let config = DaemonConfig::load()?;
    tracing::info!(
        addr = %config.bind_addr,
        max_concurrent = config.max_concurrent,
        image = %config.sandbox.image,
        timeout = ?config.sandbox.timeout,
        "configuration loaded"
    );

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
    if let Err(e) = runtime.ping().await {
        tracing::warn!(error = %e, "docker daemon not reachable yet");
    }

    let orchestrator = Orchestrator::new(runtime, config.sandbox.clone());
    if config.prebuild_image {
        if let Err(e) = orchestrator.prepare().await {
            tracing::warn!(error = %e, "image prebuild failed; retrying on first request");
        }
    }

    let pool = Arc::new(pool::ExecutionPool::new(orchestrator, config.max_concurrent));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let shutdown = {
        let pool = Arc::clone(&pool);
        async move {
            let mut signals = signals;
            if let Some(signal) = signals.next().await {
                tracing::info!(signal, "shutting down");
            }
            pool.close();
        }
    };

    server::run(listener, pool, shutdown).await?;
    handle.close();

    tracing::info!("sandcastled stopped");
    Ok(())
}
