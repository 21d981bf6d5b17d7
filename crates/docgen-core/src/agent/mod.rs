//! Agent contract.
//!
//! An [`Agent`] executes one [`AgentTask`] at a time per call and reports an
//! [`AgentResult`]. Task-level problems (missing input, analysis failure) are
//! returned as `Ok(AgentResult { success: false, .. })`. `Err(AgentError)` and
//! panics are infrastructure failures; the scheduler converts them to
//! [`ERROR_INFRASTRUCTURE`] results without touching sibling tasks.

mod builtin;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use builtin::{
    architecture_capabilities, component_capabilities, usage_capabilities, ArchitectureAgent,
    ComponentAgent, CustomAgent, UsageAgent, ARCHITECTURE, COMPONENT, COMPONENT_NAME,
    REPOSITORY_ROOT, USAGE,
};
pub use types::{
    AgentCapabilities, AgentResult, AgentTask, DEFAULT_TIMEOUT_SECONDS, ERROR_INFRASTRUCTURE,
    ERROR_MISSING_RESULT, ERROR_TIMEOUT,
};

/// Unexpected agent failure, distinct from a task-level failed result.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent internal error: {0}")]
    Internal(String),

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-execution context handed to [`Agent::process`].
///
/// The scheduler cancels `cancel` once `deadline` has passed; agents are
/// expected to observe it and stop work.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub cancel: CancellationToken,
    pub deadline: Instant,
}

impl TaskContext {
    pub fn new(cancel: CancellationToken, deadline: Instant) -> Self {
        Self { cancel, deadline }
    }

    /// Context with a fresh token and the given time budget.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(CancellationToken::new(), Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A polymorphic executor of tasks of one analysis kind.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Fixed descriptor governing scheduling limits.
    fn capabilities(&self) -> &AgentCapabilities;

    /// Execute `task`. Must not share mutable state with other invocations
    /// except through explicitly shared collaborators.
    async fn process(&self, task: AgentTask, ctx: TaskContext)
        -> Result<AgentResult, AgentError>;
}
