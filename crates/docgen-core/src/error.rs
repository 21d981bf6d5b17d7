//! Error types for docgen-core.

use docgen_state::StorageError;

use crate::fetch::FetchError;

/// Errors from the capability registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent type already registered: {type_name}")]
    DuplicateType { type_name: String },

    #[error("unknown agent type: {type_name}")]
    UnknownType { type_name: String },

    #[error("invalid capabilities for {type_name}: {reason}")]
    InvalidCapabilities { type_name: String, reason: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Precondition failures raised before any task of a batch is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task batch is empty")]
    EmptyBatch,

    #[error("duplicate task id in batch: {task_id}")]
    DuplicateTaskId { task_id: String },

    #[error("no agent registered for type {task_type} (task {task_id})")]
    UnknownType { task_id: String, task_type: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Errors from the job state machine.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {job_id} is already terminal ({status})")]
    Terminal { job_id: String, status: String },

    #[error("job {job_id} has not been started")]
    NotRunning { job_id: String },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("task {task_id} was not issued for job {job_id}")]
    UnknownTask { job_id: String, task_id: String },

    #[error("task {task_id} already has a result in job {job_id}")]
    DuplicateResult { job_id: String, task_id: String },

    #[error("job not found: {job_id}")]
    NotFound { job_id: String },
}

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Errors from the read-side query service.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    #[error("component {name} not found in project {project_id}")]
    ComponentNotFound { project_id: String, name: String },

    #[error("search query is empty")]
    EmptyQuery,

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ProjectNotFound { project_id } => QueryError::ProjectNotFound { project_id },
            other => QueryError::Storage(other),
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Malformed engine settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors surfaced by the orchestration engine to its callers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
