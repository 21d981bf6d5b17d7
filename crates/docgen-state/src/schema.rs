//! Row types for the docgen SurrealDB tables
//!
//! Tables:
//! - projects: one row per repository URL
//! - components: one row per `(project_id, name)`
//! - fragments: latest documentation per `(project_id, kind, component_id)`
//! - agent_runs: append-only task outcomes
//!
//! Rows are converted to `storage_traits` records at the store boundary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AgentRunRecord, ComponentId, ComponentRecord, ContentDigest, FragmentRecord, ProjectId,
    ProjectRecord, StorageResult,
};

/// Serialize chrono DateTime as a native SurrealDB datetime
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProjectRow {
    pub project_id: String,
    pub repo_url: String,
    pub name: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ProjectRow {
    pub fn new(repo_url: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            project_id: ProjectId::new().0,
            repo_url: repo_url.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<ProjectRow> for ProjectRecord {
    fn from(row: ProjectRow) -> Self {
        ProjectRecord {
            project_id: ProjectId(row.project_id),
            repo_url: row.repo_url,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ComponentRow {
    pub component_id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<ComponentRow> for ComponentRecord {
    fn from(row: ComponentRow) -> Self {
        ComponentRecord {
            component_id: ComponentId(row.component_id),
            project_id: ProjectId(row.project_id),
            name: row.name,
            description: row.description,
            dependencies: row.dependencies.into_iter().collect::<BTreeSet<_>>(),
            metadata: row.metadata,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FragmentRow {
    pub fragment_id: String,
    pub project_id: String,
    pub kind: String,
    #[serde(default)]
    pub component_id: Option<String>,
    pub content: String,
    pub content_digest: String,
    #[serde(with = "surreal_datetime")]
    pub generated_at: DateTime<Utc>,
}

impl FragmentRow {
    pub fn from_record(record: &FragmentRecord) -> Self {
        Self {
            fragment_id: record.fragment_id.clone(),
            project_id: record.project_id.0.clone(),
            kind: record.kind.as_str().to_string(),
            component_id: record.component_id.as_ref().map(|c| c.0.clone()),
            content: record.content.clone(),
            content_digest: record.content_digest.as_str().to_string(),
            generated_at: record.generated_at,
        }
    }
}

impl TryFrom<FragmentRow> for FragmentRecord {
    type Error = StorageError;

    fn try_from(row: FragmentRow) -> StorageResult<Self> {
        Ok(FragmentRecord {
            fragment_id: row.fragment_id,
            project_id: ProjectId(row.project_id),
            kind: row.kind.parse()?,
            component_id: row.component_id.map(ComponentId),
            content: row.content,
            content_digest: ContentDigest::try_from(row.content_digest)?,
            generated_at: row.generated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentRunRow {
    pub run_id: String,
    pub project_id: String,
    pub job_id: String,
    pub task_id: String,
    pub task_type: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl From<&AgentRunRecord> for AgentRunRow {
    fn from(record: &AgentRunRecord) -> Self {
        Self {
            run_id: record.run_id.clone(),
            project_id: record.project_id.0.clone(),
            job_id: record.job_id.clone(),
            task_id: record.task_id.clone(),
            task_type: record.task_type.clone(),
            success: record.success,
            error: record.error.clone(),
            duration_ms: record.duration_ms,
            recorded_at: record.recorded_at,
        }
    }
}

impl From<AgentRunRow> for AgentRunRecord {
    fn from(row: AgentRunRow) -> Self {
        AgentRunRecord {
            run_id: row.run_id,
            project_id: ProjectId(row.project_id),
            job_id: row.job_id,
            task_id: row.task_id,
            task_type: row.task_type,
            success: row.success,
            error: row.error,
            duration_ms: row.duration_ms,
            recorded_at: row.recorded_at,
        }
    }
}
