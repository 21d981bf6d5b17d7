//! In-memory component store
//!
//! Provides `MemoryComponentStore`, which satisfies the `ComponentStore`
//! contract without any external dependencies. Used by tests and by
//! short-lived CLI runs that do not need persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<ProjectId, ProjectRecord>,
    projects_by_url: HashMap<String, ProjectId>,
    components: HashMap<(ProjectId, String), ComponentRecord>,
    fragments: HashMap<String, FragmentRecord>,
    agent_runs: Vec<AgentRunRecord>,
}

impl Tables {
    fn require_project(&self, project_id: &ProjectId) -> StorageResult<()> {
        if self.projects.contains_key(project_id) {
            Ok(())
        } else {
            Err(StorageError::ProjectNotFound {
                project_id: project_id.0.clone(),
            })
        }
    }
}

/// In-memory component store backed by `HashMap`s behind one `RwLock`.
///
/// Every write holds the lock for the whole record, so readers never see a
/// half-applied upsert.
#[derive(Debug, Default)]
pub struct MemoryComponentStore {
    tables: RwLock<Tables>,
}

impl MemoryComponentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComponentStore for MemoryComponentStore {
    async fn upsert_project(&self, repo_url: &str, name: &str) -> StorageResult<ProjectRecord> {
        validate_project(repo_url, name)?;
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.projects_by_url.get(repo_url) {
            if let Some(project) = tables.projects.get(existing) {
                return Ok(project.clone());
            }
        }

        let now = Utc::now();
        let record = ProjectRecord {
            project_id: ProjectId::new(),
            repo_url: repo_url.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables
            .projects_by_url
            .insert(repo_url.to_string(), record.project_id.clone());
        tables
            .projects
            .insert(record.project_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_project(&self, project_id: &ProjectId) -> StorageResult<ProjectRecord> {
        let tables = self.tables.read().await;
        tables
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| StorageError::ProjectNotFound {
                project_id: project_id.0.clone(),
            })
    }

    async fn find_project_by_repo_url(
        &self,
        repo_url: &str,
    ) -> StorageResult<Option<ProjectRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .projects_by_url
            .get(repo_url)
            .and_then(|id| tables.projects.get(id))
            .cloned())
    }

    async fn list_projects(&self) -> StorageResult<Vec<ProjectRecord>> {
        let tables = self.tables.read().await;
        let mut projects: Vec<ProjectRecord> = tables.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name).then(a.repo_url.cmp(&b.repo_url)));
        Ok(projects)
    }

    async fn upsert_component(
        &self,
        project_id: &ProjectId,
        component: ComponentUpsert,
    ) -> StorageResult<ComponentRecord> {
        validate_component(&component)?;
        let mut tables = self.tables.write().await;
        tables.require_project(project_id)?;

        let key = (project_id.clone(), component.name.clone());
        let component_id = tables
            .components
            .get(&key)
            .map(|existing| existing.component_id.clone())
            .unwrap_or_default();

        let record = ComponentRecord {
            component_id,
            project_id: project_id.clone(),
            name: component.name,
            description: component.description,
            dependencies: component.dependencies,
            metadata: component.metadata,
            updated_at: Utc::now(),
        };
        tables.components.insert(key, record.clone());
        Ok(record)
    }

    async fn ensure_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<ComponentRecord> {
        validate_component_name(name)?;
        let mut tables = self.tables.write().await;
        tables.require_project(project_id)?;

        let record = tables
            .components
            .entry((project_id.clone(), name.to_string()))
            .or_insert_with(|| ComponentRecord {
                component_id: ComponentId::new(),
                project_id: project_id.clone(),
                name: name.to_string(),
                description: String::new(),
                dependencies: Default::default(),
                metadata: Default::default(),
                updated_at: Utc::now(),
            });
        Ok(record.clone())
    }

    async fn get_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<Option<ComponentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .components
            .get(&(project_id.clone(), name.to_string()))
            .cloned())
    }

    async fn list_components(
        &self,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<ComponentRecord>> {
        let tables = self.tables.read().await;
        let mut components: Vec<ComponentRecord> = tables
            .components
            .values()
            .filter(|c| &c.project_id == project_id)
            .cloned()
            .collect();
        components.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(components)
    }

    async fn append_fragment(&self, fragment: NewFragment) -> StorageResult<FragmentRecord> {
        let mut tables = self.tables.write().await;
        tables.require_project(&fragment.project_id)?;

        let key = fragment_key(
            &fragment.project_id,
            fragment.kind,
            fragment.component_id.as_ref(),
        );
        let content_digest = ContentDigest::from_bytes(fragment.content.as_bytes());

        if let Some(current) = tables.fragments.get(key.as_str()) {
            if current.content_digest == content_digest {
                return Ok(current.clone());
            }
        }

        let record = FragmentRecord {
            fragment_id: uuid::Uuid::new_v4().to_string(),
            project_id: fragment.project_id,
            kind: fragment.kind,
            component_id: fragment.component_id,
            content: fragment.content,
            content_digest,
            generated_at: Utc::now(),
        };
        tables
            .fragments
            .insert(key.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn latest_fragment(
        &self,
        project_id: &ProjectId,
        kind: FragmentKind,
        component_id: Option<&ComponentId>,
    ) -> StorageResult<Option<FragmentRecord>> {
        let key = fragment_key(project_id, kind, component_id);
        let tables = self.tables.read().await;
        Ok(tables.fragments.get(key.as_str()).cloned())
    }

    async fn list_fragments(&self, project_id: &ProjectId) -> StorageResult<Vec<FragmentRecord>> {
        let tables = self.tables.read().await;
        let mut fragments: Vec<FragmentRecord> = tables
            .fragments
            .values()
            .filter(|f| &f.project_id == project_id)
            .cloned()
            .collect();
        fragments.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.component_id.cmp(&b.component_id))
        });
        Ok(fragments)
    }

    async fn record_agent_run(&self, run: NewAgentRun) -> StorageResult<AgentRunRecord> {
        let mut tables = self.tables.write().await;
        tables.require_project(&run.project_id)?;
        let record = AgentRunRecord::from_new(run);
        tables.agent_runs.push(record.clone());
        Ok(record)
    }

    async fn list_agent_runs(&self, project_id: &ProjectId) -> StorageResult<Vec<AgentRunRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agent_runs
            .iter()
            .filter(|r| &r.project_id == project_id)
            .cloned()
            .collect())
    }
}
