//! Orchestration engine: the job submission interface.
//!
//! The engine owns the frozen capability registry, the scheduler, the job
//! registry and the store handles. A job runs as:
//!
//! ```text
//! start ─▶ fetch repository ─▶ get-or-create project ─▶ run_batch ─▶ finalize
//!                 │                     │                   │
//!                 └── failure ──────────┴──── failure ──────┴──▶ failed
//! ```
//!
//! Every settled task result is ingested into the store, appended to the
//! project's agent-run ledger and then recorded on the job through
//! [`JobSink`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use docgen_state::{ComponentStore, NewAgentRun, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn, Instrument};

use crate::agent::{
    AgentCapabilities, AgentResult, AgentTask, ARCHITECTURE, COMPONENT, COMPONENT_NAME,
    REPOSITORY_ROOT, USAGE,
};
use crate::analysis::WorkspaceAnalyzer;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fetch::{LocalFetcher, RepositoryFetcher};
use crate::ingest::Ingestor;
use crate::job::{ExportFormat, Job, JobRegistry, JobStateMachine};
use crate::metrics::METRICS;
use crate::obs;
use crate::query::QueryService;
use crate::registry::{AgentTypeInfo, CapabilityRegistry};
use crate::scheduler::{ResultSink, TaskScheduler};

/// One documentation-generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationRequest {
    pub repo_url: String,
    pub project_name: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub export_format: ExportFormat,
}

impl DocumentationRequest {
    pub fn new(repo_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            project_name: project_name.into(),
            components: Vec::new(),
            export_format: ExportFormat::default(),
        }
    }

    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_export_format(mut self, format: ExportFormat) -> Self {
        self.export_format = format;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |reason: &str| {
            Err(EngineError::InvalidRequest {
                reason: reason.to_string(),
            })
        };
        if self.repo_url.trim().is_empty() {
            return invalid("repo_url is empty");
        }
        if self.project_name.trim().is_empty() {
            return invalid("project_name is empty");
        }
        if self.components.iter().any(|c| c.trim().is_empty()) {
            return invalid("component names must not be empty");
        }
        Ok(())
    }

    /// Requested component names, trimmed, first occurrence kept.
    pub fn distinct_components(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.components
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }
}

/// Tasks for `request`: architecture, one per component, then usage.
///
/// The repository root is attached once the repository has been fetched.
pub fn plan_tasks(request: &DocumentationRequest) -> Vec<AgentTask> {
    let base = |id: String, task_type: &str| {
        AgentTask::new(id, task_type)
            .with_input("repo_url", request.repo_url.as_str())
            .with_input("project_name", request.project_name.as_str())
    };

    let mut tasks = vec![base(ARCHITECTURE.to_string(), ARCHITECTURE)];
    for name in request.distinct_components() {
        tasks.push(
            base(format!("{COMPONENT}:{name}"), COMPONENT).with_input(COMPONENT_NAME, name.as_str()),
        );
    }
    tasks.push(base(USAGE.to_string(), USAGE));
    tasks
}

/// Result sink of one job: ingest the output, log the run, then record the
/// result on the job.
pub struct JobSink {
    job: Arc<JobStateMachine>,
    store: Arc<dyn ComponentStore>,
    ingestor: Ingestor,
    project_id: ProjectId,
}

impl JobSink {
    pub fn new(
        job: Arc<JobStateMachine>,
        store: Arc<dyn ComponentStore>,
        project_id: ProjectId,
    ) -> Self {
        Self {
            job,
            ingestor: Ingestor::new(store.clone()),
            store,
            project_id,
        }
    }
}

#[async_trait]
impl ResultSink for JobSink {
    async fn accept(&self, task: &AgentTask, result: AgentResult) -> AgentResult {
        let result = self.ingestor.apply(&self.project_id, result).await;

        // The ledger is advisory; a failed append never changes the outcome.
        let run = NewAgentRun {
            project_id: self.project_id.clone(),
            job_id: self.job.id().to_string(),
            task_id: result.task_id.clone(),
            task_type: task.task_type.clone(),
            success: result.success,
            error: result.error.clone(),
            duration_ms: result.duration_ms,
        };
        if let Err(e) = self.store.record_agent_run(run).await {
            warn!(job_id = %self.job.id(), task_id = %result.task_id, error = %e, "agent run not logged");
        }

        if let Err(e) = self.job.record_result(result.clone()).await {
            warn!(job_id = %self.job.id(), task_id = %result.task_id, error = %e, "result not recorded");
        }
        result
    }
}

struct EngineInner {
    registry: Arc<CapabilityRegistry>,
    scheduler: TaskScheduler,
    jobs: JobRegistry,
    store: Arc<dyn ComponentStore>,
    fetcher: Arc<dyn RepositoryFetcher>,
    query: QueryService,
}

/// Cheap to clone; clones share the same jobs and store.
#[derive(Clone)]
pub struct OrchestrationEngine {
    inner: Arc<EngineInner>,
}

impl OrchestrationEngine {
    pub fn new(
        registry: CapabilityRegistry,
        store: Arc<dyn ComponentStore>,
        fetcher: Arc<dyn RepositoryFetcher>,
        config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        Self {
            inner: Arc::new(EngineInner {
                scheduler: TaskScheduler::new(registry.clone(), config.scheduler()),
                registry,
                jobs: JobRegistry::new(),
                query: QueryService::new(store.clone()),
                store,
                fetcher,
            }),
        }
    }

    /// Engine with the built-in agents backed by [`WorkspaceAnalyzer`] and a
    /// [`LocalFetcher`].
    pub fn with_workspace_analyzer(
        store: Arc<dyn ComponentStore>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let analyzer = Arc::new(WorkspaceAnalyzer::new().with_max_depth(config.analyzer_max_depth));
        let registry = CapabilityRegistry::with_builtin_agents(analyzer)?;
        Ok(Self::new(registry, store, Arc::new(LocalFetcher), config))
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.inner.registry
    }

    pub fn agents(&self) -> Vec<AgentTypeInfo> {
        self.inner.registry.list()
    }

    pub fn agent_capabilities(&self, type_name: &str) -> EngineResult<AgentCapabilities> {
        Ok(self.inner.registry.capabilities(type_name)?.clone())
    }

    pub fn query(&self) -> &QueryService {
        &self.inner.query
    }

    /// Validate `request` and register a pending job for it.
    async fn prepare(
        &self,
        request: &DocumentationRequest,
    ) -> EngineResult<(Arc<JobStateMachine>, Vec<AgentTask>)> {
        request.validate()?;
        let tasks = plan_tasks(request);
        self.inner.scheduler.validate(&tasks)?;

        let job = Job::new(
            request.repo_url.clone(),
            request.project_name.clone(),
            request.distinct_components(),
            request.export_format,
        );
        let machine = self.inner.jobs.insert(job).await;
        info!(job_id = %machine.id(), tasks = tasks.len(), "job accepted");
        Ok((machine, tasks))
    }

    /// Accept `request` and run it in the background. Returns the job id.
    ///
    /// Precondition failures are returned here and create no job.
    #[instrument(skip(self, request), fields(repo_url = %request.repo_url))]
    pub async fn submit(&self, request: DocumentationRequest) -> EngineResult<String> {
        let (machine, tasks) = self.prepare(&request).await?;
        let job_id = machine.id().to_string();

        let engine = self.clone();
        tokio::spawn(async move {
            engine.execute(machine, request, tasks).await;
        });
        Ok(job_id)
    }

    /// Run `request` to a terminal status and return the final job.
    #[instrument(skip(self, request), fields(repo_url = %request.repo_url))]
    pub async fn run(&self, request: DocumentationRequest) -> EngineResult<Job> {
        let (machine, tasks) = self.prepare(&request).await?;
        Ok(self.execute(machine, request, tasks).await)
    }

    pub async fn job(&self, job_id: &str) -> EngineResult<Job> {
        Ok(self.inner.jobs.get(job_id).await?.snapshot().await)
    }

    /// All jobs, newest first.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.jobs.list().await
    }

    /// Wait for `job_id` to become terminal.
    pub async fn wait(&self, job_id: &str) -> EngineResult<Job> {
        let machine = self.inner.jobs.get(job_id).await?;
        Ok(machine.wait_terminal().await)
    }

    async fn execute(
        &self,
        machine: Arc<JobStateMachine>,
        request: DocumentationRequest,
        tasks: Vec<AgentTask>,
    ) -> Job {
        let job_id = machine.id().to_string();

        let outcome = self
            .drive(&machine, &request, tasks)
            .instrument(obs::job_span(&job_id))
            .await;
        if let Err(e) = outcome {
            obs::emit_job_failed(&job_id, &e);
            if let Err(fail_err) = machine.fail(e.to_string()).await {
                warn!(job_id = %job_id, error = %fail_err, "job could not be marked failed");
            }
        }

        let job = machine.snapshot().await;
        {
            let _span = obs::JobSpan::enter(&job_id);
            obs::emit_job_finished(&job_id, job.status.as_str(), job.succeeded(), job.failed());
            METRICS.inc_jobs_finished();
            METRICS.flush();
        }
        job
    }

    async fn drive(
        &self,
        machine: &Arc<JobStateMachine>,
        request: &DocumentationRequest,
        tasks: Vec<AgentTask>,
    ) -> EngineResult<()> {
        machine
            .start(tasks.iter().map(|t| t.id.clone()).collect())
            .await?;
        obs::emit_job_started(machine.id(), &request.repo_url, tasks.len());

        let root = self.inner.fetcher.fetch(&request.repo_url).await?;
        let project = self
            .inner
            .store
            .upsert_project(&request.repo_url, &request.project_name)
            .await?;
        machine.set_project(project.project_id.to_string()).await?;

        let root = Value::String(root.to_string_lossy().to_string());
        let tasks: Vec<AgentTask> = tasks
            .into_iter()
            .map(|mut task| {
                task.input_data
                    .insert(REPOSITORY_ROOT.to_string(), root.clone());
                task
            })
            .collect();

        let sink = Arc::new(JobSink::new(
            machine.clone(),
            self.inner.store.clone(),
            project.project_id,
        ));
        self.inner.scheduler.run_batch(tasks, sink).await?;
        machine.finalize().await?;
        Ok(())
    }
}
