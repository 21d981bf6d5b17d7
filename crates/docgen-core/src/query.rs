//! Read-side query service over the component store.
//!
//! Reads only observe committed store state and never touch job state, so
//! they are independent of any running job. Every project-scoped call fails
//! with [`QueryError::ProjectNotFound`] for an unknown project.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use docgen_state::{
    AgentRunRecord, ComponentRecord, ComponentStore, FragmentKind, FragmentRecord, ProjectId,
    ProjectRecord,
};
use serde::Serialize;
use tracing::instrument;

use crate::error::{QueryError, QueryResult};

/// Declared dependency `from -> to` between two component names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureView {
    pub project: ProjectRecord,
    /// Latest architecture fragment, if one was generated.
    pub architecture: Option<FragmentRecord>,
    pub components: Vec<ComponentRecord>,
    pub edges: Vec<DependencyEdge>,
    /// Edges whose target is not a component of the project.
    pub dangling_edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: u32,
    pub component: ComponentRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStatistics {
    pub project_id: ProjectId,
    pub components: usize,
    pub fragments_by_kind: BTreeMap<FragmentKind, usize>,
    pub total_fragments: usize,
    pub dependency_edges: usize,
    pub dangling_edges: usize,
    pub total_agent_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
}

const SCORE_EXACT_NAME: u32 = 4;
const SCORE_NAME_SUBSTRING: u32 = 2;
const SCORE_DESCRIPTION_SUBSTRING: u32 = 1;

/// Relevance of `component` for lowercase `tokens`.
///
/// Per token: 4 for an exact name match, otherwise 2 for a name substring,
/// plus 1 for a description substring.
pub fn relevance(component: &ComponentRecord, tokens: &[String]) -> u32 {
    let name = component.name.to_lowercase();
    let description = component.description.to_lowercase();
    tokens
        .iter()
        .map(|token| {
            let name_score = if name == *token {
                SCORE_EXACT_NAME
            } else if name.contains(token.as_str()) {
                SCORE_NAME_SUBSTRING
            } else {
                0
            };
            let description_score = if description.contains(token.as_str()) {
                SCORE_DESCRIPTION_SUBSTRING
            } else {
                0
            };
            name_score + description_score
        })
        .sum()
}

/// Split components' dependencies into resolved and dangling edges.
fn dependency_edges(components: &[ComponentRecord]) -> (Vec<DependencyEdge>, Vec<DependencyEdge>) {
    let known: BTreeSet<&str> = components.iter().map(|c| c.name.as_str()).collect();
    let mut edges = Vec::new();
    let mut dangling = Vec::new();
    for component in components {
        for dep in &component.dependencies {
            let edge = DependencyEdge {
                from: component.name.clone(),
                to: dep.clone(),
            };
            if known.contains(dep.as_str()) {
                edges.push(edge);
            } else {
                dangling.push(edge);
            }
        }
    }
    edges.sort();
    dangling.sort();
    (edges, dangling)
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn ComponentStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn ComponentStore>) -> Self {
        Self { store }
    }

    pub async fn list_projects(&self) -> QueryResult<Vec<ProjectRecord>> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn get_project(&self, project_id: &ProjectId) -> QueryResult<ProjectRecord> {
        Ok(self.store.get_project(project_id).await?)
    }

    pub async fn find_project_by_repo_url(
        &self,
        repo_url: &str,
    ) -> QueryResult<Option<ProjectRecord>> {
        Ok(self.store.find_project_by_repo_url(repo_url).await?)
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn get_architecture(&self, project_id: &ProjectId) -> QueryResult<ArchitectureView> {
        let project = self.store.get_project(project_id).await?;
        let architecture = self
            .store
            .latest_fragment(project_id, FragmentKind::Architecture, None)
            .await?;
        let components = self.store.list_components(project_id).await?;
        let (edges, dangling_edges) = dependency_edges(&components);

        Ok(ArchitectureView {
            project,
            architecture,
            components,
            edges,
            dangling_edges,
        })
    }

    pub async fn list_components(&self, project_id: &ProjectId) -> QueryResult<Vec<ComponentRecord>> {
        self.store.get_project(project_id).await?;
        Ok(self.store.list_components(project_id).await?)
    }

    pub async fn get_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> QueryResult<ComponentRecord> {
        self.store.get_project(project_id).await?;
        self.store
            .get_component(project_id, name)
            .await?
            .ok_or_else(|| QueryError::ComponentNotFound {
                project_id: project_id.to_string(),
                name: name.to_string(),
            })
    }

    /// Components matching `query`, best match first, ties by name.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn search_components(
        &self,
        project_id: &ProjectId,
        query: &str,
    ) -> QueryResult<Vec<SearchHit>> {
        let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if tokens.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        self.store.get_project(project_id).await?;

        let mut hits: Vec<SearchHit> = self
            .store
            .list_components(project_id)
            .await?
            .into_iter()
            .filter_map(|component| {
                let score = relevance(&component, &tokens);
                (score > 0).then_some(SearchHit { score, component })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.component.name.cmp(&b.component.name))
        });
        Ok(hits)
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn get_statistics(&self, project_id: &ProjectId) -> QueryResult<ProjectStatistics> {
        self.store.get_project(project_id).await?;
        let components = self.store.list_components(project_id).await?;
        let fragments = self.store.list_fragments(project_id).await?;
        let runs = self.store.list_agent_runs(project_id).await?;
        let successful_runs = runs.iter().filter(|r| r.success).count();

        let mut fragments_by_kind: BTreeMap<FragmentKind, usize> =
            FragmentKind::ALL.iter().map(|k| (*k, 0)).collect();
        for fragment in &fragments {
            *fragments_by_kind.entry(fragment.kind).or_default() += 1;
        }
        let (edges, dangling) = dependency_edges(&components);

        Ok(ProjectStatistics {
            project_id: project_id.clone(),
            components: components.len(),
            fragments_by_kind,
            total_fragments: fragments.len(),
            dependency_edges: edges.len(),
            dangling_edges: dangling.len(),
            total_agent_runs: runs.len(),
            successful_runs,
            failed_runs: runs.len() - successful_runs,
        })
    }

    /// Agent runs logged for a project, oldest first.
    pub async fn list_agent_runs(&self, project_id: &ProjectId) -> QueryResult<Vec<AgentRunRecord>> {
        self.store.get_project(project_id).await?;
        Ok(self.store.list_agent_runs(project_id).await?)
    }
}
