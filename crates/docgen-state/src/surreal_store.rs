//! SurrealDB-backed ComponentStore implementation
//!
//! Every record is addressed by a deterministic id derived from its key
//! (see `storage_traits::{project_key, component_key, fragment_key}`), so each
//! write is a single-record statement and never leaves a partial row behind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::migrations;
use crate::schema::{AgentRunRow, ComponentRow, FragmentRow, ProjectRow};
use crate::storage_traits::*;

/// SurrealDB-backed implementation of [`ComponentStore`].
#[derive(Clone)]
pub struct SurrealComponentStore {
    db: Surreal<Any>,
}

impl SurrealComponentStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&StoreConfig::memory()).await
    }

    /// Connect using [`StoreConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    /// Connect, authenticate if credentials are given, and initialize the schema.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        if let Some(path) = config.local_path() {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let Some(creds) = &config.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealComponentStore connected ({})", config.endpoint);
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn project_by_key(&self, key: &ContentDigest) -> StorageResult<Option<ProjectRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('projects', $key)")
            .bind(("key", key.as_str().to_string()))
            .await?;
        let rows: Vec<ProjectRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_project(&self, project_id: &ProjectId) -> StorageResult<ProjectRow> {
        let mut res = self
            .db
            .query("SELECT * FROM projects WHERE project_id = $pid")
            .bind(("pid", project_id.0.clone()))
            .await?;
        let rows: Vec<ProjectRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ProjectNotFound {
                project_id: project_id.0.clone(),
            })
    }

    async fn fragment_by_key(&self, key: &ContentDigest) -> StorageResult<Option<FragmentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('fragments', $key)")
            .bind(("key", key.as_str().to_string()))
            .await?;
        let rows: Vec<FragmentRow> = res.take(0)?;
        rows.into_iter().next().map(FragmentRecord::try_from).transpose()
    }
}

#[async_trait]
impl ComponentStore for SurrealComponentStore {
    #[instrument(skip(self))]
    async fn upsert_project(&self, repo_url: &str, name: &str) -> StorageResult<ProjectRecord> {
        validate_project(repo_url, name)?;
        let key = project_key(repo_url);

        if let Some(existing) = self.project_by_key(&key).await? {
            return Ok(existing.into());
        }

        debug!("creating project");
        let created = self
            .db
            .query("CREATE type::thing('projects', $key) CONTENT $row")
            .bind(("key", key.as_str().to_string()))
            .bind(("row", ProjectRow::new(repo_url, name)))
            .await
            .and_then(|res| res.check());

        // A concurrent creator may have won the record id; its row is the answer.
        match (created, self.project_by_key(&key).await?) {
            (_, Some(row)) => Ok(row.into()),
            (Err(e), None) => Err(e.into()),
            (Ok(_), None) => Err(StorageError::Backend(format!(
                "project for {repo_url} vanished after create"
            ))),
        }
    }

    async fn get_project(&self, project_id: &ProjectId) -> StorageResult<ProjectRecord> {
        Ok(self.fetch_project(project_id).await?.into())
    }

    async fn find_project_by_repo_url(
        &self,
        repo_url: &str,
    ) -> StorageResult<Option<ProjectRecord>> {
        Ok(self
            .project_by_key(&project_key(repo_url))
            .await?
            .map(Into::into))
    }

    async fn list_projects(&self) -> StorageResult<Vec<ProjectRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM projects ORDER BY name ASC, repo_url ASC")
            .await?;
        let rows: Vec<ProjectRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, component), fields(component = %component.name))]
    async fn upsert_component(
        &self,
        project_id: &ProjectId,
        component: ComponentUpsert,
    ) -> StorageResult<ComponentRecord> {
        validate_component(&component)?;
        self.fetch_project(project_id).await?;

        let key = component_key(project_id, &component.name);
        let dependencies: Vec<String> = component.dependencies.into_iter().collect();

        let mut res = self
            .db
            .query(
                "UPSERT type::thing('components', $key) SET \
                    component_id = component_id ?? $component_id, \
                    project_id = $project_id, \
                    name = $name, \
                    description = $description, \
                    dependencies = $dependencies, \
                    metadata = $metadata, \
                    updated_at = $updated_at \
                 RETURN AFTER",
            )
            .bind(("key", key.as_str().to_string()))
            .bind(("component_id", ComponentId::new().0))
            .bind(("project_id", project_id.0.clone()))
            .bind(("name", component.name))
            .bind(("description", component.description))
            .bind(("dependencies", dependencies))
            .bind(("metadata", component.metadata))
            .bind(("updated_at", SurrealDatetime::from(Utc::now())))
            .await?;

        let rows: Vec<ComponentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StorageError::Backend("component upsert returned no row".to_string()))
    }

    #[instrument(skip(self))]
    async fn ensure_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<ComponentRecord> {
        validate_component_name(name)?;
        self.fetch_project(project_id).await?;

        // Existing fields win; only a missing record is filled with defaults.
        let mut res = self
            .db
            .query(
                "UPSERT type::thing('components', $key) SET \
                    component_id = component_id ?? $component_id, \
                    project_id = $project_id, \
                    name = $name, \
                    description = description ?? $description, \
                    dependencies = dependencies ?? $dependencies, \
                    metadata = metadata ?? $metadata, \
                    updated_at = updated_at ?? $updated_at \
                 RETURN AFTER",
            )
            .bind(("key", component_key(project_id, name).as_str().to_string()))
            .bind(("component_id", ComponentId::new().0))
            .bind(("project_id", project_id.0.clone()))
            .bind(("name", name.to_string()))
            .bind(("description", String::new()))
            .bind(("dependencies", Vec::<String>::new()))
            .bind(("metadata", BTreeMap::<String, serde_json::Value>::new()))
            .bind(("updated_at", SurrealDatetime::from(Utc::now())))
            .await?;

        let rows: Vec<ComponentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StorageError::Backend("component ensure returned no row".to_string()))
    }

    async fn get_component(
        &self,
        project_id: &ProjectId,
        name: &str,
    ) -> StorageResult<Option<ComponentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('components', $key)")
            .bind(("key", component_key(project_id, name).as_str().to_string()))
            .await?;
        let rows: Vec<ComponentRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn list_components(
        &self,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<ComponentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM components WHERE project_id = $pid ORDER BY name ASC")
            .bind(("pid", project_id.0.clone()))
            .await?;
        let rows: Vec<ComponentRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, fragment), fields(kind = %fragment.kind))]
    async fn append_fragment(&self, fragment: NewFragment) -> StorageResult<FragmentRecord> {
        self.fetch_project(&fragment.project_id).await?;

        let key = fragment_key(
            &fragment.project_id,
            fragment.kind,
            fragment.component_id.as_ref(),
        );
        let content_digest = ContentDigest::from_bytes(fragment.content.as_bytes());

        if let Some(current) = self.fragment_by_key(&key).await? {
            if current.content_digest == content_digest {
                debug!(digest = %content_digest.short(), "fragment unchanged");
                return Ok(current);
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

        self.db
            .query("UPSERT type::thing('fragments', $key) CONTENT $row")
            .bind(("key", key.as_str().to_string()))
            .bind(("row", FragmentRow::from_record(&record)))
            .await?
            .check()?;

        Ok(record)
    }

    async fn latest_fragment(
        &self,
        project_id: &ProjectId,
        kind: FragmentKind,
        component_id: Option<&ComponentId>,
    ) -> StorageResult<Option<FragmentRecord>> {
        self.fragment_by_key(&fragment_key(project_id, kind, component_id))
            .await
    }

    async fn list_fragments(&self, project_id: &ProjectId) -> StorageResult<Vec<FragmentRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM fragments WHERE project_id = $pid \
                 ORDER BY kind ASC, component_id ASC",
            )
            .bind(("pid", project_id.0.clone()))
            .await?;
        let rows: Vec<FragmentRow> = res.take(0)?;
        rows.into_iter().map(FragmentRecord::try_from).collect()
    }

    #[instrument(skip(self, run), fields(task_id = %run.task_id, success = run.success))]
    async fn record_agent_run(&self, run: NewAgentRun) -> StorageResult<AgentRunRecord> {
        self.fetch_project(&run.project_id).await?;

        let record = AgentRunRecord::from_new(run);
        self.db
            .query("CREATE type::thing('agent_runs', $run_id) CONTENT $row")
            .bind(("run_id", record.run_id.clone()))
            .bind(("row", AgentRunRow::from(&record)))
            .await?
            .check()?;

        Ok(record)
    }

    async fn list_agent_runs(&self, project_id: &ProjectId) -> StorageResult<Vec<AgentRunRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM agent_runs WHERE project_id = $pid \
                 ORDER BY recorded_at ASC, run_id ASC",
            )
            .bind(("pid", project_id.0.clone()))
            .await?;
        let rows: Vec<AgentRunRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
