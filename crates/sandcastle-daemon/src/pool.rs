//! Execution slot management

use sandcastle_core::protocol::{ExecuteRequest, StatusResponse};
use sandcastle_core::{ExecutionResult, Orchestrator, Result, SandcastleError};
use tokio::sync::Semaphore;

/// Bounds how many sandboxes run at once.
///
/// Each execution holds one permit for its whole lifetime, including
/// teardown. Callers beyond the limit wait for a permit.
pub struct ExecutionPool {
    orchestrator: Orchestrator,
    slots: Semaphore,
    total: usize,
}

impl ExecutionPool {
    pub fn new(orchestrator: Orchestrator, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            slots: Semaphore::new(max_concurrent),
            total: max_concurrent,
        }
    }

    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Execute code once a slot is free
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| SandcastleError::runtime("acquire", "execution pool closed"))?;

        self.orchestrator.execute(request).await
    }

    /// Stop handing out slots; waiting callers fail.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn status(&self) -> StatusResponse {
        let idle = self.slots.available_permits().min(self.total);
        StatusResponse {
            total: self.total,
            busy: self.total - idle,
            idle,
        }
    }
}
