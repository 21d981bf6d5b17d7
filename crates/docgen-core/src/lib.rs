//! docgen core library
//!
//! Coordinates documentation-generation jobs across concurrently running
//! analysis agents, aggregates their output into the component store and
//! serves it back through the query service.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod job;
pub mod metrics;
pub mod obs;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod telemetry;

pub use agent::{
    Agent, AgentCapabilities, AgentError, AgentResult, AgentTask, CustomAgent, TaskContext,
    ERROR_INFRASTRUCTURE, ERROR_MISSING_RESULT, ERROR_TIMEOUT,
};
pub use analysis::{AnalysisKind, AnalysisRequest, Analyzer, WorkspaceAnalyzer};
pub use config::EngineConfig;
pub use engine::{plan_tasks, DocumentationRequest, JobSink, OrchestrationEngine};
pub use error::{
    ConfigError, ConfigResult, EngineError, EngineResult, JobError, JobResult, QueryError,
    QueryResult, RegistryError, RegistryResult, SchedulerError, SchedulerResult,
};
pub use fetch::{FetchError, LocalFetcher, RepositoryFetcher};
pub use ingest::{AnalysisPayload, IngestError, IngestSummary, Ingestor};
pub use job::{ExportFormat, Job, JobRegistry, JobStateMachine, JobStatus};
pub use metrics::METRICS;
pub use obs::JobSpan;
pub use query::{ArchitectureView, DependencyEdge, ProjectStatistics, QueryService, SearchHit};
pub use registry::{AgentTypeInfo, CapabilityRegistry};
pub use scheduler::{NoopSink, ResultSink, ResultSlots, SchedulerConfig, TaskScheduler};
pub use telemetry::init_tracing;
