//! Task scheduler.
//!
//! Executes a batch of [`AgentTask`]s and returns exactly one
//! [`AgentResult`] per task, in submission order.
//!
//! - Tasks are grouped by type. Each type gets a lane with a semaphore of
//!   `max_parallel_tasks` permits, acquired in submission order (FIFO).
//! - Lanes of different types run fully in parallel.
//! - Each admitted task races its deadline. On timeout a `"timeout"` result
//!   is settled at once, the task's token is cancelled, and after
//!   `cancellation_grace` the execution is aborted. The permit is held until
//!   the execution has actually stopped; anything it returns is discarded.
//! - An agent `Err` or panic settles as `"infrastructure_failure"`.
//!
//! Every settled result passes through a [`ResultSink`] before it is stored.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::agent::{
    Agent, AgentCapabilities, AgentResult, AgentTask, TaskContext, ERROR_MISSING_RESULT,
};
use crate::error::{SchedulerError, SchedulerResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::CapabilityRegistry;

/// Default time an agent gets to wind down after its token is cancelled.
pub const DEFAULT_CANCELLATION_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cancellation_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cancellation_grace: DEFAULT_CANCELLATION_GRACE,
        }
    }
}

/// Receives each settled result exactly once and may replace it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn accept(&self, task: &AgentTask, result: AgentResult) -> AgentResult;
}

/// Sink that keeps results unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl ResultSink for NoopSink {
    async fn accept(&self, _task: &AgentTask, result: AgentResult) -> AgentResult {
        result
    }
}

/// Per-batch settlement table keyed by task id. The first settlement of an
/// issued task wins; anything later is rejected.
#[derive(Debug)]
pub struct ResultSlots {
    issued: HashSet<String>,
    settled: Mutex<HashMap<String, Option<AgentResult>>>,
}

impl ResultSlots {
    pub fn new<I: IntoIterator<Item = String>>(task_ids: I) -> Self {
        Self {
            issued: task_ids.into_iter().collect(),
            settled: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the slot of `task_id`. False if unknown or already claimed.
    pub async fn claim(&self, task_id: &str) -> bool {
        if !self.issued.contains(task_id) {
            return false;
        }
        let mut settled = self.settled.lock().await;
        if settled.contains_key(task_id) {
            return false;
        }
        settled.insert(task_id.to_string(), None);
        true
    }

    /// Store the final result of a claimed slot.
    pub async fn fill(&self, result: AgentResult) {
        let mut settled = self.settled.lock().await;
        if let Some(slot) = settled.get_mut(&result.task_id) {
            *slot = Some(result);
        }
    }

    /// Remove and return the stored result of `task_id`.
    pub async fn take(&self, task_id: &str) -> Option<AgentResult> {
        self.settled.lock().await.remove(task_id).flatten()
    }
}

struct Lane {
    task_type: String,
    capabilities: AgentCapabilities,
    agent: Arc<dyn Agent>,
    tasks: Vec<AgentTask>,
}

#[derive(Clone)]
struct Settlement {
    slots: Arc<ResultSlots>,
    sink: Arc<dyn ResultSink>,
}

impl Settlement {
    async fn settle(&self, task: &AgentTask, result: AgentResult) -> bool {
        if !self.slots.claim(&task.id).await {
            METRICS.inc_late_discarded();
            obs::emit_late_result_discarded(&task.id);
            return false;
        }
        let result = self.sink.accept(task, result).await;
        METRICS.record_outcome(result.success, result.is_timeout());
        obs::emit_task_finished(
            &task.id,
            result.success,
            result.duration_ms,
            result.error.as_deref(),
        );
        self.slots.fill(result).await;
        true
    }
}

pub struct TaskScheduler {
    registry: Arc<CapabilityRegistry>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(registry: Arc<CapabilityRegistry>, config: SchedulerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Check batch preconditions without dispatching anything.
    pub fn validate(&self, tasks: &[AgentTask]) -> SchedulerResult<()> {
        if tasks.is_empty() {
            return Err(SchedulerError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(SchedulerError::DuplicateTaskId {
                    task_id: task.id.clone(),
                });
            }
            if !self.registry.contains(&task.task_type) {
                return Err(SchedulerError::UnknownType {
                    task_id: task.id.clone(),
                    task_type: task.task_type.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run `tasks` to completion. Precondition failures are returned before
    /// any task is dispatched; task-level failures are returned as results.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run_batch(
        &self,
        tasks: Vec<AgentTask>,
        sink: Arc<dyn ResultSink>,
    ) -> SchedulerResult<Vec<AgentResult>> {
        self.validate(&tasks)?;

        let mut groups: BTreeMap<String, Vec<AgentTask>> = BTreeMap::new();
        for task in &tasks {
            groups
                .entry(task.task_type.clone())
                .or_default()
                .push(task.clone());
        }

        let mut lanes = Vec::with_capacity(groups.len());
        for (task_type, group) in groups {
            lanes.push(Lane {
                capabilities: self.registry.capabilities(&task_type)?.clone(),
                agent: self.registry.create(&task_type)?,
                task_type,
                tasks: group,
            });
        }

        let settlement = Settlement {
            slots: Arc::new(ResultSlots::new(tasks.iter().map(|t| t.id.clone()))),
            sink: sink.clone(),
        };
        let grace = self.config.cancellation_grace;

        join_all(
            lanes
                .into_iter()
                .map(|lane| run_lane(lane, settlement.clone(), grace)),
        )
        .await;

        let mut results = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let result = match settlement.slots.take(&task.id).await {
                Some(result) => result,
                None => {
                    warn!(task_id = %task.id, "task produced no result");
                    let missing = AgentResult::failure(&task.id, ERROR_MISSING_RESULT, Duration::ZERO);
                    sink.accept(task, missing).await
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}

async fn run_lane(lane: Lane, settlement: Settlement, grace: Duration) {
    let Lane {
        task_type,
        capabilities,
        agent,
        tasks,
    } = lane;
    let semaphore = Arc::new(Semaphore::new(capabilities.max_parallel_tasks));
    debug!(task_type = %task_type, window = capabilities.max_parallel_tasks, queued = tasks.len(), "lane started");

    let mut running = Vec::with_capacity(tasks.len());
    for task in tasks {
        // Sequential acquisition keeps admission in submission order.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let timeout = task.effective_timeout(&capabilities);
        running.push(tokio::spawn(supervise(
            agent.clone(),
            task,
            timeout,
            grace,
            permit,
            settlement.clone(),
        )));
    }

    for handle in running {
        if let Err(e) = handle.await {
            warn!(task_type = %task_type, error = %e, "task supervisor crashed");
        }
    }
}

fn describe_join_error(err: &JoinError) -> &'static str {
    if err.is_panic() {
        "agent panicked"
    } else {
        "agent execution cancelled"
    }
}

/// Agents may misreport their own id or omit payload fields.
fn normalize(mut result: AgentResult, task_id: &str) -> AgentResult {
    result.task_id = task_id.to_string();
    if result.success {
        result.error = None;
        result.data.get_or_insert_with(Default::default);
    } else {
        result.data = None;
        result
            .error
            .get_or_insert_with(|| "agent reported failure".to_string());
    }
    result
}

async fn supervise(
    agent: Arc<dyn Agent>,
    task: AgentTask,
    timeout: Duration,
    grace: Duration,
    _permit: OwnedSemaphorePermit,
    settlement: Settlement,
) {
    let started = Instant::now();
    let deadline = started + timeout;
    let timeout_ms = timeout.as_millis() as u64;
    let cancel = CancellationToken::new();
    let ctx = TaskContext::new(cancel.clone(), deadline);

    METRICS.inc_dispatched();
    obs::emit_task_dispatched(&task.id, &task.task_type, timeout_ms);

    let owned = task.clone();
    let mut execution = tokio::spawn(async move { agent.process(owned, ctx).await });

    let joined = tokio::select! {
        biased;
        joined = &mut execution => Some(joined),
        _ = tokio::time::sleep_until(deadline) => None,
    };

    let Some(joined) = joined else {
        cancel.cancel();
        obs::emit_task_timed_out(&task.id, timeout_ms);
        settlement
            .settle(&task, AgentResult::timeout(&task.id, started.elapsed()))
            .await;

        match tokio::time::timeout(grace, &mut execution).await {
            Ok(_) => {
                METRICS.inc_late_discarded();
                obs::emit_late_result_discarded(&task.id);
            }
            Err(_) => {
                execution.abort();
                let _ = execution.await;
            }
        }
        return;
    };

    let result = match joined {
        Ok(Ok(result)) => normalize(result, &task.id),
        Ok(Err(err)) => {
            obs::emit_task_infrastructure_failure(&task.id, &err);
            AgentResult::infrastructure_failure(&task.id, started.elapsed())
        }
        Err(err) => {
            obs::emit_task_infrastructure_failure(&task.id, &describe_join_error(&err));
            AgentResult::infrastructure_failure(&task.id, started.elapsed())
        }
    };
    settlement.settle(&task, result).await;
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    #[tokio::test]
    async fn test_slots_first_settlement_wins() {
        let slots = ResultSlots::new(["a".to_string(), "b".to_string()]);

        assert!(slots.claim("a").await);
        assert!(!slots.claim("a").await);
        assert!(!slots.claim("zzz").await);

        slots
            .fill(AgentResult::timeout("a", Duration::from_millis(5)))
            .await;
        let taken = slots.take("a").await.unwrap();
        assert!(taken.is_timeout());
        assert!(slots.take("b").await.is_none());
    }

    #[test]
    fn test_normalize_enforces_result_shape() {
        let mut bogus = AgentResult::success("other", Map::new(), Duration::ZERO);
        bogus.data = None;
        bogus.error = Some("ignored".to_string());
        let fixed = normalize(bogus, "t1");
        assert_eq!(fixed.task_id, "t1");
        assert!(fixed.data.is_some());
        assert!(fixed.error.is_none());

        let mut silent = AgentResult::failure("t2", "x", Duration::ZERO);
        silent.error = None;
        let fixed = normalize(silent, "t2");
        assert!(fixed.error.is_some());
    }
}
