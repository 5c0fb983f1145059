//! # sandcastle-core
//!
//! Container-backed sandbox orchestration for untrusted code execution.
//!
//! This crate drives an external container runtime; it implements no
//! isolation primitives itself. Per request it:
//! - resolves the language recipe ([`language`])
//! - stages the submitted code in a scoped workspace ([`workspace`])
//! - makes sure the execution image exists ([`image`])
//! - runs one resource-capped container under a wall-clock timeout ([`sandbox`])
//! - collects output, elapsed time and peak memory ([`collector`])
//!
//! [`Orchestrator`] wires these together behind the [`ContainerRuntime`] seam.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod collector;
pub mod config;
pub mod docker;
pub mod error;
pub mod image;
pub mod language;
pub mod orchestrator;
pub mod protocol;
pub mod result;
pub mod runtime;
pub mod sandbox;
pub mod workspace;

pub use config::SandboxConfig;
pub use error::SandcastleError;
pub use language::{Language, LanguageProfile};
pub use orchestrator::Orchestrator;
pub use result::{ExecutionResult, Outcome};
pub use runtime::ContainerRuntime;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, SandcastleError>;
