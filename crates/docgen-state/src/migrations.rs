//! SurrealDB schema initialization
//!
//! Safe to call on every connection: every definition uses `IF NOT EXISTS`.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all docgen tables.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing docgen SurrealDB schema");

    init_projects_table(db).await?;
    init_components_table(db).await?;
    init_fragments_table(db).await?;
    init_agent_runs_table(db).await?;

    info!("docgen schema initialization complete");
    Ok(())
}

/// `projects` table
///
/// ```text
/// TABLE projects {
///   id:          projects:<sha256(repo_url)>
///   project_id:  STRING (unique)
///   repo_url:    STRING (unique)
///   name:        STRING
///   created_at:  DATETIME
///   updated_at:  DATETIME
/// }
/// ```
async fn init_projects_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing projects table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS projects SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_project_id ON TABLE projects COLUMNS project_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_project_repo_url ON TABLE projects COLUMNS repo_url UNIQUE;
    "#;

    run(db, sql).await
}

/// `components` table
///
/// ```text
/// TABLE components {
///   id:            components:<sha256(project_id, name)>
///   component_id:  STRING (stable across upserts)
///   project_id:    STRING (indexed)
///   name:          STRING
///   description:   STRING
///   dependencies:  ARRAY<STRING>
///   metadata:      OBJECT
///   updated_at:    DATETIME
/// }
/// ```
///
/// `(project_id, name)` is unique.
async fn init_components_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing components table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS components SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_component_key ON TABLE components COLUMNS project_id, name UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_component_project ON TABLE components COLUMNS project_id;
    "#;

    run(db, sql).await
}

/// `fragments` table
///
/// ```text
/// TABLE fragments {
///   id:              fragments:<sha256(project_id, kind, component_id)>
///   fragment_id:     STRING
///   project_id:      STRING (indexed)
///   kind:            STRING (architecture | component | usage)
///   component_id:    STRING?
///   content:         STRING
///   content_digest:  STRING
///   generated_at:    DATETIME
/// }
/// ```
///
/// The record id is derived from the fragment key, so writing a fragment
/// replaces its predecessor.
async fn init_fragments_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing fragments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS fragments SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_fragment_project ON TABLE fragments COLUMNS project_id;
        DEFINE INDEX IF NOT EXISTS idx_fragment_kind ON TABLE fragments COLUMNS project_id, kind;
    "#;

    run(db, sql).await
}

/// `agent_runs` table
///
/// ```text
/// TABLE agent_runs {
///   id:           agent_runs:<run_id>
///   run_id:       STRING
///   project_id:   STRING (indexed)
///   job_id:       STRING
///   task_id:      STRING
///   task_type:    STRING
///   success:      BOOL
///   error:        STRING?
///   duration_ms:  INT
///   recorded_at:  DATETIME
/// }
/// ```
///
/// Append-only: rows are never updated.
async fn init_agent_runs_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing agent_runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_runs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_run_project ON TABLE agent_runs COLUMNS project_id;
    "#;

    run(db, sql).await
}

async fn run(db: &Surreal<Any>, sql: &str) -> StorageResult<()> {
    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    Ok(())
}
