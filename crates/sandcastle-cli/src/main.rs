//! sandcastle CLI - Command line interface for the execution service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandcastle_core::config::default_daemon_addr;
use sandcastle_core::docker::DockerRuntime;
use sandcastle_core::protocol::ExecuteRequest;
use sandcastle_core::{Language, Orchestrator, SandboxConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sandcastle")]
#[command(author, version, about = "Run untrusted code in throwaway containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code via the daemon
    Exec {
        /// Code to execute (or - for stdin)
        code: String,

        /// Language of the submitted code
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Daemon address (defaults to SANDCASTLE_ADDR env var or 127.0.0.1:8080)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Get daemon status
    Status {
        /// Daemon address (defaults to SANDCASTLE_ADDR env var or 127.0.0.1:8080)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Ping the daemon
    Ping {
        /// Daemon address (defaults to SANDCASTLE_ADDR env var or 127.0.0.1:8080)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Run code directly against the local Docker daemon
    Run {
        /// Code to execute (or - for stdin)
        code: String,

        /// Language of the submitted code
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Memory limit in MB
        #[arg(short, long, default_value = "256")]
        memory: u64,

        /// Allow network access
        #[arg(long)]
        network: bool,

        /// Execution image tag
        #[arg(long, default_value = "code-sandbox")]
        image: String,

        /// Directory holding the image's Dockerfile
        #[arg(long, default_value = "docker")]
        build_context: PathBuf,
    },

    /// List supported languages
    Languages,
}

fn read_code(code: String) -> Result<String> {
    if code == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading code from stdin")?;
        Ok(buf)
    } else {
        Ok(code)
    }
}

fn base_url(addr: Option<String>) -> String {
    let addr = addr.unwrap_or_else(default_daemon_addr);
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr
    } else {
        format!("http://{addr}")
    }
}

/// Print a daemon response body; non-2xx answers become errors.
async fn report(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.context("decoding daemon response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    anyhow::ensure!(status.is_success(), "daemon answered {status}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sandcastle=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Exec {
            code,
            language,
            addr,
        } => {
            let request = ExecuteRequest::new(read_code(code)?, language);
            let url = format!("{}/execute", base_url(addr));
            tracing::debug!(%url, "submitting code");
            let response = client
                .post(&url)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("connecting to {url}"))?;
            report(response).await?;
        }

        Commands::Status { addr } => {
            let url = format!("{}/status", base_url(addr));
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("connecting to {url}"))?;
            report(response).await?;
        }

        Commands::Ping { addr } => {
            let url = format!("{}/health", base_url(addr));
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("connecting to {url}"))?;
            report(response).await?;
        }

        Commands::Run {
            code,
            language,
            timeout,
            memory,
            network,
            image,
            build_context,
        } => {
            let config = SandboxConfig::builder()
                .image(image)
                .build_context(build_context)
                .timeout_secs(timeout)
                .memory_limit_mb(memory)
                .allow_network(network)
                .build();
            config.validate()?;

            let orchestrator = Orchestrator::new(Arc::new(DockerRuntime::connect()?), config);
            let request = ExecuteRequest::new(read_code(code)?, language);
            request.validate()?;

            let result = orchestrator.execute(&request).await?;
            println!("{}", result.output);
            eprintln!(
                "{:?} in {}ms, memory {}",
                result.outcome,
                result.elapsed_millis(),
                result.memory_usage()
            );
        }

        Commands::Languages => {
            for language in Language::ALL {
                let profile = language.profile();
                println!("{language:<12}{}", profile.artifact_file_name);
            }
        }
    }

    Ok(())
}
