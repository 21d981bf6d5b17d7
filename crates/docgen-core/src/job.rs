//! Job state machine.
//!
//! ```text
//! pending ──start──▶ running ──finalize──▶ completed | partial | failed
//!    │                  │
//!    └──────fail────────┴──────────────────▶ failed
//! ```
//!
//! [`JobStateMachine`] is the only writer of a job's status and results.
//! Every mutation takes the job's lock, so concurrent result reports are
//! serialized. Terminal jobs reject all mutations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use crate::agent::{AgentResult, ERROR_MISSING_RESULT};
use crate::error::{JobError, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        }
    }

    /// Terminal status for a set of outcomes. No outcomes means failed.
    pub fn from_outcomes<'a, I: IntoIterator<Item = &'a AgentResult>>(results: I) -> Self {
        let (mut ok, mut failed) = (0usize, 0usize);
        for result in results {
            if result.success {
                ok += 1;
            } else {
                failed += 1;
            }
        }
        match (ok, failed) {
            (0, _) => JobStatus::Failed,
            (_, 0) => JobStatus::Completed,
            _ => JobStatus::Partial,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format requested for a job. Recorded only; exporting is external.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Confluence,
    Markdown,
    Both,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExportFormat::Confluence => "confluence",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Both => "both",
        })
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confluence" => Ok(ExportFormat::Confluence),
            "markdown" => Ok(ExportFormat::Markdown),
            "both" => Ok(ExportFormat::Both),
            other => Err(format!(
                "unknown export format '{other}' (expected confluence, markdown or both)"
            )),
        }
    }
}

/// Time-derived job id: `doc_<YYYYmmdd_HHMMSS>_<8 hex>`.
pub fn new_job_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("doc_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// One documentation-generation request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub repo_url: String,
    pub project_name: String,
    pub export_format: ExportFormat,
    pub requested_components: Vec<String>,
    /// Task ids issued for this job, in submission order.
    pub issued_tasks: Vec<String>,
    pub task_results: BTreeMap<String, AgentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Job-level failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        repo_url: impl Into<String>,
        project_name: impl Into<String>,
        requested_components: Vec<String>,
        export_format: ExportFormat,
    ) -> Self {
        Self {
            id: new_job_id(),
            status: JobStatus::Pending,
            repo_url: repo_url.into(),
            project_name: project_name.into(),
            export_format,
            requested_components,
            issued_tasks: Vec::new(),
            task_results: BTreeMap::new(),
            project_id: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.task_results.values().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.task_results.values().filter(|r| !r.success).count()
    }
}

/// Sole writer of one [`Job`].
#[derive(Debug)]
pub struct JobStateMachine {
    id: String,
    job: Mutex<Job>,
    terminal: watch::Sender<Option<JobStatus>>,
}

impl JobStateMachine {
    pub fn new(job: Job) -> Self {
        let (terminal, _) = watch::channel(None);
        Self {
            id: job.id.clone(),
            job: Mutex::new(job),
            terminal,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn ensure_open(job: &Job) -> JobResult<()> {
        if job.status.is_terminal() {
            return Err(JobError::Terminal {
                job_id: job.id.clone(),
                status: job.status.to_string(),
            });
        }
        Ok(())
    }

    fn close(&self, job: &mut Job, status: JobStatus) {
        job.status = status;
        job.completed_at = Some(Utc::now());
        self.terminal.send_replace(Some(status));
        debug!(job_id = %job.id, status = %status, "job reached terminal status");
    }

    /// `pending → running`, recording the issued task ids.
    pub async fn start(&self, task_ids: Vec<String>) -> JobResult<()> {
        let mut job = self.job.lock().await;
        Self::ensure_open(&job)?;
        if job.status != JobStatus::Pending {
            return Err(JobError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status.to_string(),
                to: JobStatus::Running.to_string(),
            });
        }
        job.status = JobStatus::Running;
        job.issued_tasks = task_ids;
        Ok(())
    }

    /// Attach the resolved project.
    pub async fn set_project(&self, project_id: impl Into<String>) -> JobResult<()> {
        let mut job = self.job.lock().await;
        Self::ensure_open(&job)?;
        job.project_id = Some(project_id.into());
        Ok(())
    }

    /// Record the single result of an issued task.
    pub async fn record_result(&self, result: AgentResult) -> JobResult<()> {
        let mut job = self.job.lock().await;
        Self::ensure_open(&job)?;
        if job.status != JobStatus::Running {
            return Err(JobError::NotRunning {
                job_id: job.id.clone(),
            });
        }
        if !job.issued_tasks.contains(&result.task_id) {
            return Err(JobError::UnknownTask {
                job_id: job.id.clone(),
                task_id: result.task_id,
            });
        }
        if job.task_results.contains_key(&result.task_id) {
            return Err(JobError::DuplicateResult {
                job_id: job.id.clone(),
                task_id: result.task_id,
            });
        }
        job.task_results.insert(result.task_id.clone(), result);
        Ok(())
    }

    /// `running → completed | partial | failed` from the recorded outcomes.
    /// Issued tasks without a result are recorded as `missing_result` first.
    pub async fn finalize(&self) -> JobResult<JobStatus> {
        let mut job = self.job.lock().await;
        Self::ensure_open(&job)?;
        if job.status != JobStatus::Running {
            return Err(JobError::NotRunning {
                job_id: job.id.clone(),
            });
        }

        let missing: Vec<String> = job
            .issued_tasks
            .iter()
            .filter(|id| !job.task_results.contains_key(*id))
            .cloned()
            .collect();
        for task_id in missing {
            let result =
                AgentResult::failure(&task_id, ERROR_MISSING_RESULT, std::time::Duration::ZERO);
            job.task_results.insert(task_id, result);
        }

        let status = JobStatus::from_outcomes(job.task_results.values());
        self.close(&mut job, status);
        Ok(status)
    }

    /// Fail a pending or running job with a job-level reason.
    pub async fn fail(&self, reason: impl Into<String>) -> JobResult<()> {
        let mut job = self.job.lock().await;
        Self::ensure_open(&job)?;
        job.error = Some(reason.into());
        self.close(&mut job, JobStatus::Failed);
        Ok(())
    }

    pub async fn snapshot(&self) -> Job {
        self.job.lock().await.clone()
    }

    pub async fn status(&self) -> JobStatus {
        self.job.lock().await.status
    }

    /// Wait until the job is terminal and return its final state.
    pub async fn wait_terminal(&self) -> Job {
        let mut rx = self.terminal.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|status| status.is_some()).await;
        self.snapshot().await
    }
}

/// All jobs of this process.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobStateMachine>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) -> Arc<JobStateMachine> {
        let machine = Arc::new(JobStateMachine::new(job));
        self.jobs
            .write()
            .await
            .insert(machine.id().to_string(), machine.clone());
        machine
    }

    pub async fn get(&self, job_id: &str) -> JobResult<Arc<JobStateMachine>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Snapshots of all jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let machines: Vec<Arc<JobStateMachine>> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(machines.len());
        for machine in machines {
            jobs.push(machine.snapshot().await);
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }
}
