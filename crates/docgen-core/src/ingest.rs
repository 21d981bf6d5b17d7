//! Write path from successful results into the component store.
//!
//! A successful result's `data` is read as an analysis payload. Components
//! are upserted first, then fragments are appended with component names
//! resolved to ids. A result only stays successful once its output is
//! committed; parse and store errors downgrade it to a failure.
//!
//! The whole payload is validated and the project checked before the first
//! write, so malformed output never reaches the store. Writes are atomic one
//! record at a time, not per payload: a backend error partway through leaves
//! the earlier records committed. They are superseded by the next run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use docgen_state::{
    ComponentId, ComponentStore, ComponentUpsert, FragmentKind, NewFragment, ProjectId,
    StorageError,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::agent::AgentResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub components: Vec<ComponentPayload>,
    #[serde(default)]
    pub fragments: Vec<FragmentPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FragmentPayload {
    pub kind: FragmentKind,
    /// Component name for component-scoped fragments.
    #[serde(default)]
    pub component: Option<String>,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid_output: {0}")]
    InvalidOutput(String),

    #[error("store_write_failed: {0}")]
    Store(#[from] StorageError),
}

/// What one ingestion committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub components: usize,
    pub fragments: usize,
}

impl AnalysisPayload {
    pub fn parse(data: &Map<String, Value>) -> Result<Self, IngestError> {
        let payload: AnalysisPayload = serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| IngestError::InvalidOutput(e.to_string()))?;

        for component in &payload.components {
            if component.name.trim().is_empty() {
                return Err(IngestError::InvalidOutput(
                    "component with empty name".to_string(),
                ));
            }
        }
        for fragment in &payload.fragments {
            match fragment.component.as_deref() {
                None if fragment.kind == FragmentKind::Component => {
                    return Err(IngestError::InvalidOutput(
                        "component fragment without component name".to_string(),
                    ));
                }
                Some(name) if name.trim().is_empty() => {
                    return Err(IngestError::InvalidOutput(
                        "fragment with empty component name".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(payload)
    }
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn ComponentStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ComponentStore>) -> Self {
        Self { store }
    }

    /// Commit `data` for `project_id`.
    #[instrument(skip(self, data), fields(project_id = %project_id))]
    pub async fn ingest(
        &self,
        project_id: &ProjectId,
        data: &Map<String, Value>,
    ) -> Result<IngestSummary, IngestError> {
        let payload = AnalysisPayload::parse(data)?;
        self.store.get_project(project_id).await?;
        let mut ids: HashMap<String, ComponentId> = HashMap::new();

        for component in payload.components {
            let record = self
                .store
                .upsert_component(
                    project_id,
                    ComponentUpsert {
                        name: component.name,
                        description: component.description,
                        dependencies: component.dependencies.into_iter().collect(),
                        metadata: component.metadata,
                    },
                )
                .await?;
            ids.insert(record.name, record.component_id);
        }
        let components = ids.len();

        let mut fragments = 0;
        for fragment in payload.fragments {
            let component_id = match fragment.component {
                Some(name) => Some(self.resolve_component(project_id, &name, &mut ids).await?),
                None => None,
            };
            self.store
                .append_fragment(NewFragment {
                    project_id: project_id.clone(),
                    kind: fragment.kind,
                    component_id,
                    content: fragment.content,
                })
                .await?;
            fragments += 1;
        }

        debug!(components, fragments, "analysis output committed");
        Ok(IngestSummary {
            components,
            fragments,
        })
    }

    /// Id for `name`, creating a bare component if the project has none.
    /// A record committed concurrently by another task is never replaced.
    async fn resolve_component(
        &self,
        project_id: &ProjectId,
        name: &str,
        ids: &mut HashMap<String, ComponentId>,
    ) -> Result<ComponentId, IngestError> {
        if let Some(id) = ids.get(name) {
            return Ok(id.clone());
        }
        let record = self.store.ensure_component(project_id, name).await?;
        ids.insert(name.to_string(), record.component_id.clone());
        Ok(record.component_id)
    }

    /// Commit a successful result's output; downgrade it if that fails.
    /// Failed results pass through untouched.
    pub async fn apply(&self, project_id: &ProjectId, mut result: AgentResult) -> AgentResult {
        if !result.success {
            return result;
        }
        let data = result.data.take().unwrap_or_default();
        match self.ingest(project_id, &data).await {
            Ok(_) => {
                result.data = Some(data);
                result
            }
            Err(e) => {
                warn!(task_id = %result.task_id, error = %e, "result output not committed");
                result.success = false;
                result.error = Some(e.to_string());
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use docgen_state::{
        AgentRunRecord, ComponentRecord, FragmentRecord, MemoryComponentStore, NewAgentRun,
        ProjectRecord, StorageResult,
    };
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;

    /// Pauses the first component lookup so another writer can commit in
    /// between.
    struct GatedStore {
        inner: Arc<MemoryComponentStore>,
        armed: AtomicBool,
        reached: Notify,
        resume: Notify,
    }

    impl GatedStore {
        fn new(inner: Arc<MemoryComponentStore>) -> Self {
            Self {
                inner,
                armed: AtomicBool::new(true),
                reached: Notify::new(),
                resume: Notify::new(),
            }
        }

        async fn gate(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
        }
    }

    #[async_trait]
    impl ComponentStore for GatedStore {
        async fn upsert_project(&self, repo_url: &str, name: &str) -> StorageResult<ProjectRecord> {
            self.inner.upsert_project(repo_url, name).await
        }

        async fn get_project(&self, project_id: &ProjectId) -> StorageResult<ProjectRecord> {
            self.inner.get_project(project_id).await
        }

        async fn find_project_by_repo_url(
            &self,
            repo_url: &str,
        ) -> StorageResult<Option<ProjectRecord>> {
            self.inner.find_project_by_repo_url(repo_url).await
        }

        async fn list_projects(&self) -> StorageResult<Vec<ProjectRecord>> {
            self.inner.list_projects().await
        }

        async fn upsert_component(
            &self,
            project_id: &ProjectId,
            component: ComponentUpsert,
        ) -> StorageResult<ComponentRecord> {
            self.inner.upsert_component(project_id, component).await
        }

        async fn ensure_component(
            &self,
            project_id: &ProjectId,
            name: &str,
        ) -> StorageResult<ComponentRecord> {
            self.gate().await;
            self.inner.ensure_component(project_id, name).await
        }

        async fn get_component(
            &self,
            project_id: &ProjectId,
            name: &str,
        ) -> StorageResult<Option<ComponentRecord>> {
            let found = self.inner.get_component(project_id, name).await;
            self.gate().await;
            found
        }

        async fn list_components(
            &self,
            project_id: &ProjectId,
        ) -> StorageResult<Vec<ComponentRecord>> {
            self.inner.list_components(project_id).await
        }

        async fn append_fragment(&self, fragment: NewFragment) -> StorageResult<FragmentRecord> {
            self.inner.append_fragment(fragment).await
        }

        async fn latest_fragment(
            &self,
            project_id: &ProjectId,
            kind: FragmentKind,
            component_id: Option<&ComponentId>,
        ) -> StorageResult<Option<FragmentRecord>> {
            self.inner.latest_fragment(project_id, kind, component_id).await
        }

        async fn list_fragments(
            &self,
            project_id: &ProjectId,
        ) -> StorageResult<Vec<FragmentRecord>> {
            self.inner.list_fragments(project_id).await
        }

        async fn record_agent_run(&self, run: NewAgentRun) -> StorageResult<AgentRunRecord> {
            self.inner.record_agent_run(run).await
        }

        async fn list_agent_runs(
            &self,
            project_id: &ProjectId,
        ) -> StorageResult<Vec<AgentRunRecord>> {
            self.inner.list_agent_runs(project_id).await
        }
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    async fn setup() -> (Ingestor, Arc<MemoryComponentStore>, ProjectId) {
        let store = Arc::new(MemoryComponentStore::new());
        let project = store
            .upsert_project("file:///repo", "repo")
            .await
            .unwrap();
        (Ingestor::new(store.clone()), store, project.project_id)
    }

    #[tokio::test]
    async fn test_components_then_fragments() {
        let (ingestor, store, pid) = setup().await;
        let data = map(json!({
            "components": [
                {"name": "Lexer", "description": "tokens", "dependencies": ["Source"]}
            ],
            "fragments": [
                {"kind": "component", "component": "Lexer", "content": "lexer docs"},
                {"kind": "component", "component": "Parser", "content": "parser docs"},
                {"kind": "architecture", "content": "overview"}
            ]
        }));

        let summary = ingestor.ingest(&pid, &data).await.unwrap();
        assert_eq!(summary, IngestSummary { components: 1, fragments: 3 });

        // "Parser" had no record, so a bare one was created for its fragment.
        let parser = store.get_component(&pid, "Parser").await.unwrap().unwrap();
        assert!(parser.description.is_empty());
        let doc = store
            .latest_fragment(&pid, FragmentKind::Component, Some(&parser.component_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.content, "parser docs");
    }

    #[tokio::test]
    async fn test_bad_payload_downgrades_result() {
        let (ingestor, _store, pid) = setup().await;
        let data = map(json!({"fragments": [{"kind": "changelog", "content": "x"}]}));
        let result = AgentResult::success("t1", data, Duration::from_millis(3));

        let applied = ingestor.apply(&pid, result).await;
        assert!(!applied.success);
        assert!(applied.data.is_none());
        assert!(applied.error.unwrap().starts_with("invalid_output:"));
    }

    #[tokio::test]
    async fn test_store_failure_downgrades_result() {
        let (ingestor, _store, _pid) = setup().await;
        let data = map(json!({"components": [{"name": "A"}]}));
        let result = AgentResult::success("t1", data, Duration::ZERO);

        let applied = ingestor.apply(&ProjectId::from("ghost"), result).await;
        assert!(!applied.success);
        assert!(applied.error.unwrap().starts_with("store_write_failed:"));
    }

    #[tokio::test]
    async fn test_failed_results_pass_through() {
        let (ingestor, _store, pid) = setup().await;
        let result = AgentResult::timeout("t1", Duration::from_millis(500));
        let applied = ingestor.apply(&pid, result.clone()).await;
        assert_eq!(applied, result);
    }

    #[test]
    fn test_component_fragment_requires_name() {
        let data = map(json!({"fragments": [{"kind": "component", "content": "x"}]}));
        assert!(matches!(
            AnalysisPayload::parse(&data),
            Err(IngestError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_fragment_lookup_keeps_concurrently_committed_component() {
        let inner = Arc::new(MemoryComponentStore::new());
        let pid = inner
            .upsert_project("file:///repo", "repo")
            .await
            .unwrap()
            .project_id;
        let gated = Arc::new(GatedStore::new(inner.clone()));

        // The usage task only references "Parser"; the component task owns it.
        let usage = Ingestor::new(gated.clone());
        let usage_data = map(json!({
            "fragments": [{"kind": "component", "component": "Parser", "content": "parser docs"}]
        }));
        let usage_task = {
            let pid = pid.clone();
            tokio::spawn(async move { usage.ingest(&pid, &usage_data).await })
        };

        gated.reached.notified().await;
        Ingestor::new(inner.clone())
            .ingest(
                &pid,
                &map(json!({
                    "components": [
                        {"name": "Parser", "description": "Parses tokens", "dependencies": ["Lexer"]}
                    ]
                })),
            )
            .await
            .unwrap();
        gated.resume.notify_one();

        usage_task.await.unwrap().unwrap();

        let parser = inner.get_component(&pid, "Parser").await.unwrap().unwrap();
        assert_eq!(parser.description, "Parses tokens");
        assert!(parser.dependencies.contains("Lexer"));
        let doc = inner
            .latest_fragment(&pid, FragmentKind::Component, Some(&parser.component_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.content, "parser docs");
    }

    #[tokio::test]
    async fn test_invalid_fragment_rejected_before_any_write() {
        let (ingestor, store, pid) = setup().await;
        let data = map(json!({
            "components": [{"name": "Lexer", "description": "tokens"}],
            "fragments": [
                {"kind": "architecture", "content": "overview"},
                {"kind": "usage", "component": "  ", "content": "x"}
            ]
        }));
        let result = AgentResult::success("t1", data, Duration::ZERO);

        let applied = ingestor.apply(&pid, result).await;
        assert!(!applied.success);
        assert!(applied.error.unwrap().starts_with("invalid_output:"));
        assert!(store.list_components(&pid).await.unwrap().is_empty());
        assert!(store.list_fragments(&pid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_writes_nothing() {
        let (ingestor, store, pid) = setup().await;
        let data = map(json!({"components": [{"name": "A"}]}));

        let err = ingestor
            .ingest(&ProjectId::from("ghost"), &data)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Store(StorageError::ProjectNotFound { .. })
        ));
        assert!(store.list_components(&pid).await.unwrap().is_empty());
    }
}
