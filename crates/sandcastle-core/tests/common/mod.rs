//! Scripted in-memory container runtime

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sandcastle_core::runtime::{ContainerRuntime, ContainerSpec, ExitStatus, UsageSnapshot};
use sandcastle_core::{Result, SandcastleError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// What the "program" in the container does
#[derive(Debug, Clone)]
pub enum Program {
    /// Exit after `after` with the given status
    Exits {
        after: Duration,
        code: i64,
        oom_killed: bool,
    },
    /// Never exit on its own
    Hangs,
    /// The wait call itself fails
    WaitFails,
}

impl Program {
    pub const fn exits_immediately(code: i64) -> Self {
        Self::Exits {
            after: Duration::ZERO,
            code,
            oom_killed: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub build: bool,
    pub create: bool,
    pub start: bool,
    pub stop: bool,
    pub stats: bool,
    pub remove: bool,
}

/// Spec as seen at create time, plus the artifact contents at that moment
#[derive(Debug, Clone)]
pub struct Created {
    pub spec: ContainerSpec,
    pub artifact: Option<String>,
}

pub struct FakeRuntime {
    pub program: Program,
    pub logs: Vec<u8>,
    pub usage: UsageSnapshot,
    pub fail: Failures,
    pub build_time: Duration,
    /// `stop` and `remove` never return
    pub stuck_cleanup: bool,
    image_present: AtomicBool,
    builds: AtomicUsize,
    next_id: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
    created: Mutex<Vec<Created>>,
}

impl FakeRuntime {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            logs: Vec::new(),
            usage: UsageSnapshot::default(),
            fail: Failures::default(),
            build_time: Duration::from_millis(20),
            stuck_cleanup: false,
            image_present: AtomicBool::new(true),
            builds: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.as_bytes().to_vec();
        self
    }

    #[must_use]
    pub fn with_usage(mut self, peak_bytes: u64) -> Self {
        self.usage = UsageSnapshot {
            memory_usage_bytes: Some(peak_bytes / 2),
            memory_peak_bytes: Some(peak_bytes),
        };
        self
    }

    #[must_use]
    pub fn with_failures(mut self, fail: Failures) -> Self {
        self.fail = fail;
        self
    }

    #[must_use]
    pub fn with_stuck_cleanup(mut self) -> Self {
        self.stuck_cleanup = true;
        self
    }

    #[must_use]
    pub fn without_image(self) -> Self {
        self.image_present.store(false, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == op).count()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<Created> {
        self.created.lock().clone()
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().push(op);
    }

    fn failure(op: &'static str) -> SandcastleError {
        SandcastleError::runtime(op, format!("injected {op} failure"))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        self.record("ping");
        Ok(())
    }

    async fn image_exists(&self, _image: &str) -> Result<bool> {
        self.record("image_exists");
        Ok(self.image_present.load(Ordering::SeqCst))
    }

    async fn build_image(&self, _image: &str, _context: &Path) -> Result<()> {
        self.record("build_image");
        self.builds.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.build_time).await;
        if self.fail.build {
            return Err(SandcastleError::ImageBuild("injected build failure".into()));
        }
        self.image_present.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        self.record("create");
        if self.fail.create {
            return Err(Self::failure("create"));
        }
        let artifact = spec
            .binds
            .first()
            .and_then(|bind| std::fs::read_to_string(&bind.host).ok());
        self.created.lock().push(Created {
            spec: spec.clone(),
            artifact,
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("container-{n}"))
    }

    async fn start(&self, _id: &str) -> Result<()> {
        self.record("start");
        if self.fail.start {
            return Err(Self::failure("start"));
        }
        Ok(())
    }

    async fn wait(&self, _id: &str) -> Result<ExitStatus> {
        self.record("wait");
        match self.program {
            Program::Exits {
                after,
                code,
                oom_killed,
            } => {
                tokio::time::sleep(after).await;
                Ok(ExitStatus { code, oom_killed })
            }
            Program::Hangs => std::future::pending().await,
            Program::WaitFails => Err(Self::failure("wait")),
        }
    }

    async fn stop(&self, _id: &str, _grace: Duration) -> Result<()> {
        self.record("stop");
        if self.stuck_cleanup {
            std::future::pending::<()>().await;
        }
        if self.fail.stop {
            return Err(Self::failure("stop"));
        }
        Ok(())
    }

    async fn logs(&self, _id: &str) -> Result<Vec<u8>> {
        self.record("logs");
        Ok(self.logs.clone())
    }

    async fn stats(&self, _id: &str) -> Result<UsageSnapshot> {
        self.record("stats");
        if self.fail.stats {
            return Err(Self::failure("stats"));
        }
        Ok(self.usage)
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        self.record("remove");
        if self.stuck_cleanup {
            std::future::pending::<()>().await;
        }
        if self.fail.remove {
            return Err(Self::failure("remove"));
        }
        Ok(())
    }
}
