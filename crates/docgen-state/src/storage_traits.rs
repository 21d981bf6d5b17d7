//! Storage trait definitions for docgen
//!
//! The component store is the single source of truth for generated
//! documentation:
//! - projects, unique per repository URL
//! - components, upserted by `(project_id, name)`
//! - documentation fragments, superseded by `(project_id, kind, component_id)`
//! - agent runs, an append-only ledger of task outcomes per project
//!
//! The trait is async and backend-agnostic. An in-memory implementation lives
//! in the `fakes` module, a SurrealDB one in `surreal_store`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of a composite key; parts are NUL-separated so `("ab", "c")`
    /// and `("a", "bc")` never collide.
    pub fn from_key_parts(parts: &[&str]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidRecord {
                reason: format!("invalid content digest: {s}"),
            });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random ProjectId
    pub fn new() -> Self {
        ProjectId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

/// Unique identifier for a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    /// Generate a new random ComponentId
    pub fn new() -> Self {
        ComponentId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A documented repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    pub repo_url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attributes written by an upsert. The key is `(project_id, name)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpsert {
    pub name: String,
    pub description: String,
    pub dependencies: BTreeSet<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ComponentUpsert {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A component as committed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub component_id: ComponentId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub dependencies: BTreeSet<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of generated documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Architecture,
    Component,
    Usage,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 3] = [
        FragmentKind::Architecture,
        FragmentKind::Component,
        FragmentKind::Usage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Architecture => "architecture",
            FragmentKind::Component => "component",
            FragmentKind::Usage => "usage",
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FragmentKind {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "architecture" => Ok(FragmentKind::Architecture),
            "component" => Ok(FragmentKind::Component),
            "usage" => Ok(FragmentKind::Usage),
            other => Err(StorageError::InvalidRecord {
                reason: format!("unknown fragment kind: {other}"),
            }),
        }
    }
}

/// A fragment to append. `component_id = None` means project-level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFragment {
    pub project_id: ProjectId,
    pub kind: FragmentKind,
    pub component_id: Option<ComponentId>,
    pub content: String,
}

/// The latest fragment for a `(project_id, kind, component_id)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub fragment_id: String,
    pub project_id: ProjectId,
    pub kind: FragmentKind,
    pub component_id: Option<ComponentId>,
    pub content: String,
    pub content_digest: ContentDigest,
    pub generated_at: DateTime<Utc>,
}

/// Outcome of one agent task, appended to the run ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgentRun {
    pub project_id: ProjectId,
    pub job_id: String,
    pub task_id: String,
    pub task_type: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A recorded agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunRecord {
    pub run_id: String,
    pub project_id: ProjectId,
    pub job_id: String,
    pub task_id: String,
    pub task_type: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AgentRunRecord {
    pub(crate) fn from_new(run: NewAgentRun) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            project_id: run.project_id,
            job_id: run.job_id,
            task_id: run.task_id,
            task_type: run.task_type,
            success: run.success,
            error: run.error,
            duration_ms: run.duration_ms,
            recorded_at: Utc::now(),
        }
    }
}

/// Deterministic store key of a component.
pub fn component_key(project_id: &ProjectId, name: &str) -> ContentDigest {
    ContentDigest::from_key_parts(&["component", &project_id.0, name])
}

/// Deterministic store key of a fragment slot.
pub fn fragment_key(
    project_id: &ProjectId,
    kind: FragmentKind,
    component_id: Option<&ComponentId>,
) -> ContentDigest {
    let component = component_id.map(|c| c.0.as_str()).unwrap_or("");
    ContentDigest::from_key_parts(&["fragment", &project_id.0, kind.as_str(), component])
}

/// Deterministic store key of a project.
pub fn project_key(repo_url: &str) -> ContentDigest {
    ContentDigest::from_key_parts(&["project", repo_url])
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Durable, queryable record of projects, components and fragments.
///
/// Guarantees:
/// - `upsert_project` is get-or-create by `repo_url`.
/// - `upsert_component` replaces all attributes under `(project_id, name)`
///   atomically; the `component_id` of an existing record is kept.
/// - `ensure_component` never modifies an existing record.
/// - `append_fragment` supersedes any fragment with the same
///   `(project_id, kind, component_id)`; only the latest is kept.
/// - Readers never observe a partially written record.
#[async_trait]
pub trait ComponentStore: Send + Sync {
    /// Return the project for `repo_url`, creating it on first reference.
    async fn upsert_project(&self, repo_url: &str, name: &str) -> StorageResult<ProjectRecord>;

    /// Fetch a project. Returns `StorageError::ProjectNotFound` if absent.
    async fn get_project(&self, project_id: &ProjectId) -> StorageResult<ProjectRecord>;

    /// Look a project up by repository URL.
    async fn find_project_by_repo_url(&self, repo_url: &str)
        -> StorageResult<Option<ProjectRecord>>;

    /// All projects ordered by name.
    async fn list_projects(&self) -> StorageResult<Vec<ProjectRecord>>;

    /// Insert or replace a component keyed by `(project_id, name)`.
    async fn upsert_component(
        &self,
        project_id: &ProjectId,
        component: ComponentUpsert,
    ) -> StorageResult<ComponentRecord>;

    /// Return the component named `name`, creating a bare record only if none
    /// exists. Lookup and creation are a single atomic step.
    async fn ensure_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<ComponentRecord>;

    /// Fetch a component by name.
    async fn get_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<Option<ComponentRecord>>;

    /// All components of a project ordered by name.
    async fn list_components(&self, project_id: &ProjectId)
        -> StorageResult<Vec<ComponentRecord>>;

    /// Append a fragment, superseding the previous one with the same key.
    async fn append_fragment(&self, fragment: NewFragment) -> StorageResult<FragmentRecord>;

    /// Latest fragment for a key, if any.
    async fn latest_fragment(
        &self,
        project_id: &ProjectId,
        kind: FragmentKind,
        component_id: Option<&ComponentId>,
    ) -> StorageResult<Option<FragmentRecord>>;

    /// All current fragments of a project.
    async fn list_fragments(&self, project_id: &ProjectId) -> StorageResult<Vec<FragmentRecord>>;

    /// Append an agent run to the ledger.
    async fn record_agent_run(&self, run: NewAgentRun) -> StorageResult<AgentRunRecord>;

    /// All agent runs of a project, oldest first.
    async fn list_agent_runs(&self, project_id: &ProjectId) -> StorageResult<Vec<AgentRunRecord>>;
}

/// Reject empty key fields before they reach a backend.
pub(crate) fn validate_component(component: &ComponentUpsert) -> StorageResult<()> {
    validate_component_name(&component.name)
}

pub(crate) fn validate_component_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            reason: "component name must not be empty".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_project(repo_url: &str, name: &str) -> StorageResult<()> {
    if repo_url.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            reason: "repo_url must not be empty".to_string(),
        });
    }
    if name.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            reason: "project name must not be empty".to_string(),
        });
    }
    Ok(())
}
