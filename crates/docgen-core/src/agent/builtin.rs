//! Built-in agent variants.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use tracing::debug;

use super::{Agent, AgentCapabilities, AgentError, AgentResult, AgentTask, TaskContext};
use crate::analysis::{AnalysisKind, AnalysisRequest, Analyzer};

/// Agent type names of the built-in variants.
pub const ARCHITECTURE: &str = "architecture";
pub const COMPONENT: &str = "component";
pub const USAGE: &str = "usage";

/// Task input keys read by the built-in variants.
pub const REPOSITORY_ROOT: &str = "repository_root";
pub const COMPONENT_NAME: &str = "component_name";

pub fn architecture_capabilities() -> AgentCapabilities {
    AgentCapabilities::new(
        "architecture_analyzer",
        "Analyzes repository architecture and generates documentation",
    )
    .with_input_types(["repository_url", "project_structure"])
    .with_output_types(["architecture_analysis", "mermaid_diagrams", "confluence_content"])
    .with_languages(["python", "javascript", "typescript", "java", "go", "rust"])
    .with_max_parallel_tasks(3)
}

pub fn component_capabilities() -> AgentCapabilities {
    AgentCapabilities::new(
        "component_documenter",
        "Generates detailed documentation for individual components",
    )
    .with_input_types(["component_info", "source_code"])
    .with_output_types(["component_documentation", "api_reference", "usage_examples"])
    .with_languages(["python", "javascript", "typescript", "java", "rust"])
    .with_max_parallel_tasks(5)
}

pub fn usage_capabilities() -> AgentCapabilities {
    AgentCapabilities::new(
        "usage_guide_generator",
        "Generates usage guides, tutorials, and best practices documentation",
    )
    .with_input_types(["project_info", "api_endpoints", "examples"])
    .with_output_types(["usage_guide", "tutorials", "best_practices"])
    .with_languages(["any"])
    .with_max_parallel_tasks(3)
}

/// Shared body of the analyzer-backed variants.
async fn run_analysis(
    analyzer: &dyn Analyzer,
    kind: AnalysisKind,
    task: &AgentTask,
    ctx: TaskContext,
) -> AgentResult {
    let started = Instant::now();

    let Some(root) = task.input_str(REPOSITORY_ROOT) else {
        return AgentResult::failure(
            &task.id,
            format!("missing required input: {REPOSITORY_ROOT}"),
            started.elapsed(),
        );
    };

    let request = AnalysisRequest {
        kind,
        repository_root: PathBuf::from(root),
        input: task.input_data.clone(),
    };

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            return AgentResult::failure(&task.id, "cancelled", started.elapsed());
        }
        outcome = analyzer.analyze(request, ctx.cancel.clone()) => outcome,
    };

    match outcome {
        Ok(data) => AgentResult::success(&task.id, data, started.elapsed()),
        Err(e) => {
            debug!(task_id = %task.id, error = %e, "analysis failed");
            AgentResult::failure(&task.id, format!("analysis_failed: {e:#}"), started.elapsed())
        }
    }
}

/// Whole-repository architecture analysis.
#[derive(Clone)]
pub struct ArchitectureAgent {
    capabilities: AgentCapabilities,
    analyzer: Arc<dyn Analyzer>,
}

impl ArchitectureAgent {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            capabilities: architecture_capabilities(),
            analyzer,
        }
    }
}

#[async_trait]
impl Agent for ArchitectureAgent {
    fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    async fn process(
        &self,
        task: AgentTask,
        ctx: TaskContext,
    ) -> Result<AgentResult, AgentError> {
        Ok(run_analysis(self.analyzer.as_ref(), AnalysisKind::Architecture, &task, ctx).await)
    }
}

/// Documentation of one named component. Requires `component_name`.
#[derive(Clone)]
pub struct ComponentAgent {
    capabilities: AgentCapabilities,
    analyzer: Arc<dyn Analyzer>,
}

impl ComponentAgent {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            capabilities: component_capabilities(),
            analyzer,
        }
    }
}

#[async_trait]
impl Agent for ComponentAgent {
    fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    async fn process(
        &self,
        task: AgentTask,
        ctx: TaskContext,
    ) -> Result<AgentResult, AgentError> {
        let Some(name) = task.input_str(COMPONENT_NAME).map(str::to_string) else {
            return Ok(AgentResult::failure(
                &task.id,
                format!("missing required input: {COMPONENT_NAME}"),
                std::time::Duration::ZERO,
            ));
        };
        let kind = AnalysisKind::Component { name };
        Ok(run_analysis(self.analyzer.as_ref(), kind, &task, ctx).await)
    }
}

/// Usage guide generation.
#[derive(Clone)]
pub struct UsageAgent {
    capabilities: AgentCapabilities,
    analyzer: Arc<dyn Analyzer>,
}

impl UsageAgent {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            capabilities: usage_capabilities(),
            analyzer,
        }
    }
}

#[async_trait]
impl Agent for UsageAgent {
    fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    async fn process(
        &self,
        task: AgentTask,
        ctx: TaskContext,
    ) -> Result<AgentResult, AgentError> {
        Ok(run_analysis(self.analyzer.as_ref(), AnalysisKind::Usage, &task, ctx).await)
    }
}

type Handler =
    Arc<dyn Fn(AgentTask, TaskContext) -> BoxFuture<'static, Result<AgentResult, AgentError>> + Send + Sync>;

/// Agent with caller-declared capabilities and an async handler.
///
/// ```ignore
/// let agent = CustomAgent::new(
///     AgentCapabilities::new("changelog", "Summarises release notes"),
///     |task, _ctx| async move {
///         Ok(AgentResult::success(task.id, Default::default(), Duration::ZERO))
///     },
/// );
/// ```
#[derive(Clone)]
pub struct CustomAgent {
    capabilities: AgentCapabilities,
    handler: Handler,
}

impl CustomAgent {
    pub fn new<F, Fut>(capabilities: AgentCapabilities, handler: F) -> Self
    where
        F: Fn(AgentTask, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AgentResult, AgentError>> + Send + 'static,
    {
        Self {
            capabilities,
            handler: Arc::new(move |task, ctx| handler(task, ctx).boxed()),
        }
    }
}

#[async_trait]
impl Agent for CustomAgent {
    fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    async fn process(
        &self,
        task: AgentTask,
        ctx: TaskContext,
    ) -> Result<AgentResult, AgentError> {
        (self.handler)(task, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Map, Value};
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct EchoAnalyzer;

    #[async_trait]
    impl Analyzer for EchoAnalyzer {
        async fn analyze(
            &self,
            request: AnalysisRequest,
            _cancel: CancellationToken,
        ) -> anyhow::Result<Map<String, Value>> {
            let mut out = Map::new();
            let kind = match request.kind {
                AnalysisKind::Architecture => "architecture".to_string(),
                AnalysisKind::Component { name } => format!("component:{name}"),
                AnalysisKind::Usage => "usage".to_string(),
            };
            out.insert("kind".into(), json!(kind));
            Ok(out)
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(
            &self,
            _request: AnalysisRequest,
            _cancel: CancellationToken,
        ) -> anyhow::Result<Map<String, Value>> {
            anyhow::bail!("model unavailable")
        }
    }

    fn ctx() -> TaskContext {
        TaskContext::with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_repository_root_is_task_failure() {
        let agent = ArchitectureAgent::new(Arc::new(EchoAnalyzer));
        let result = agent
            .process(AgentTask::new("architecture", ARCHITECTURE), ctx())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains(REPOSITORY_ROOT));
    }

    #[tokio::test]
    async fn test_component_requires_name() {
        let agent = ComponentAgent::new(Arc::new(EchoAnalyzer));
        let task = AgentTask::new("component:x", COMPONENT).with_input(REPOSITORY_ROOT, "/repo");
        let result = agent.process(task, ctx()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains(COMPONENT_NAME));
    }

    #[tokio::test]
    async fn test_component_passes_name_to_analyzer() {
        let agent = ComponentAgent::new(Arc::new(EchoAnalyzer));
        let task = AgentTask::new("component:Lexer", COMPONENT)
            .with_input(REPOSITORY_ROOT, "/repo")
            .with_input(COMPONENT_NAME, "Lexer");
        let result = agent.process(task, ctx()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["kind"], "component:Lexer");
    }

    #[tokio::test]
    async fn test_analyzer_error_is_task_failure() {
        let agent = UsageAgent::new(Arc::new(FailingAnalyzer));
        let task = AgentTask::new("usage", USAGE).with_input(REPOSITORY_ROOT, "/repo");
        let result = agent.process(task, ctx()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_custom_agent_runs_handler() {
        let agent = CustomAgent::new(AgentCapabilities::new("echo", "echo"), |task, _ctx| async move {
            Ok(AgentResult::success(task.id, Map::new(), Duration::ZERO))
        });
        let result = agent
            .process(AgentTask::new("t1", "echo"), ctx())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.task_id, "t1");
    }

    #[test]
    fn test_builtin_limits() {
        assert_eq!(architecture_capabilities().max_parallel_tasks, 3);
        assert_eq!(component_capabilities().max_parallel_tasks, 5);
        assert_eq!(usage_capabilities().max_parallel_tasks, 3);
        assert_eq!(usage_capabilities().timeout_seconds, 300);
    }
}
