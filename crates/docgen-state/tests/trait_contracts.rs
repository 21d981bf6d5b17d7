//! Trait contract tests for ComponentStore.
//!
//! Each contract is written once against `&dyn ComponentStore` and run for
//! both the in-memory store and SurrealDB on `mem://`.

use std::sync::Arc;

use docgen_state::storage_traits::*;
use docgen_state::{MemoryComponentStore, StorageError, StoreConfig, SurrealComponentStore};

const REPO: &str = "https://github.com/acme/widgets";

async fn project(store: &dyn ComponentStore) -> ProjectRecord {
    store.upsert_project(REPO, "widgets").await.unwrap()
}

// ===========================================================================
// Contracts
// ===========================================================================

async fn upsert_project_is_get_or_create(store: &dyn ComponentStore) {
    let first = store.upsert_project(REPO, "widgets").await.unwrap();
    let second = store.upsert_project(REPO, "renamed").await.unwrap();

    assert_eq!(first.project_id, second.project_id);
    assert_eq!(second.name, "widgets");

    let found = store.find_project_by_repo_url(REPO).await.unwrap().unwrap();
    assert_eq!(found.project_id, first.project_id);
    assert!(store
        .find_project_by_repo_url("https://example.com/other")
        .await
        .unwrap()
        .is_none());

    let fetched = store.get_project(&first.project_id).await.unwrap();
    assert_eq!(fetched.repo_url, REPO);
}

async fn get_project_unknown_is_not_found(store: &dyn ComponentStore) {
    let err = store
        .get_project(&ProjectId::from("no-such-project"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProjectNotFound { .. }));
}

async fn list_projects_sorted_by_name(store: &dyn ComponentStore) {
    store.upsert_project("https://x/zeta", "zeta").await.unwrap();
    store.upsert_project("https://x/alpha", "alpha").await.unwrap();

    let names: Vec<String> = store
        .list_projects()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

async fn upsert_component_replaces_attributes(store: &dyn ComponentStore) {
    let p = project(store).await;

    let first = store
        .upsert_component(
            &p.project_id,
            ComponentUpsert::new("CacheManager")
                .with_description("LRU cache")
                .with_dependencies(["Storage"]),
        )
        .await
        .unwrap();

    let second = store
        .upsert_component(
            &p.project_id,
            ComponentUpsert::new("CacheManager")
                .with_description("TTL cache")
                .with_metadata("language", serde_json::json!("rust")),
        )
        .await
        .unwrap();

    assert_eq!(first.component_id, second.component_id);

    let stored = store
        .get_component(&p.project_id, "CacheManager")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description, "TTL cache");
    assert!(stored.dependencies.is_empty());
    assert_eq!(stored.metadata["language"], serde_json::json!("rust"));
    assert_eq!(store.list_components(&p.project_id).await.unwrap().len(), 1);
}

async fn component_write_for_unknown_project_fails(store: &dyn ComponentStore) {
    let err = store
        .upsert_component(&ProjectId::from("ghost"), ComponentUpsert::new("A"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProjectNotFound { .. }));
}

async fn empty_component_name_rejected(store: &dyn ComponentStore) {
    let p = project(store).await;
    let err = store
        .upsert_component(&p.project_id, ComponentUpsert::new("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord { .. }));
}

async fn list_components_sorted_and_scoped(store: &dyn ComponentStore) {
    let p = project(store).await;
    let other = store.upsert_project("https://x/other", "other").await.unwrap();

    for name in ["Parser", "Api", "Lexer"] {
        store
            .upsert_component(&p.project_id, ComponentUpsert::new(name))
            .await
            .unwrap();
    }
    store
        .upsert_component(&other.project_id, ComponentUpsert::new("Elsewhere"))
        .await
        .unwrap();

    let names: Vec<String> = store
        .list_components(&p.project_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Api", "Lexer", "Parser"]);
}

async fn append_fragment_supersedes(store: &dyn ComponentStore) {
    let p = project(store).await;

    let first = store
        .append_fragment(NewFragment {
            project_id: p.project_id.clone(),
            kind: FragmentKind::Architecture,
            component_id: None,
            content: "v1".to_string(),
        })
        .await
        .unwrap();
    store
        .append_fragment(NewFragment {
            project_id: p.project_id.clone(),
            kind: FragmentKind::Architecture,
            component_id: None,
            content: "v2".to_string(),
        })
        .await
        .unwrap();

    let latest = store
        .latest_fragment(&p.project_id, FragmentKind::Architecture, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.content, "v2");
    assert_ne!(latest.fragment_id, first.fragment_id);
    assert_eq!(latest.content_digest, ContentDigest::from_bytes(b"v2"));
    assert_eq!(store.list_fragments(&p.project_id).await.unwrap().len(), 1);
}

async fn append_identical_content_is_noop(store: &dyn ComponentStore) {
    let p = project(store).await;
    let fragment = NewFragment {
        project_id: p.project_id.clone(),
        kind: FragmentKind::Usage,
        component_id: None,
        content: "same".to_string(),
    };

    let first = store.append_fragment(fragment.clone()).await.unwrap();
    let second = store.append_fragment(fragment).await.unwrap();

    assert_eq!(first.fragment_id, second.fragment_id);
    assert_eq!(first.content_digest, second.content_digest);
}

async fn fragments_keyed_by_component(store: &dyn ComponentStore) {
    let p = project(store).await;
    let c = store
        .upsert_component(&p.project_id, ComponentUpsert::new("Lexer"))
        .await
        .unwrap();

    store
        .append_fragment(NewFragment {
            project_id: p.project_id.clone(),
            kind: FragmentKind::Component,
            component_id: Some(c.component_id.clone()),
            content: "lexer docs".to_string(),
        })
        .await
        .unwrap();

    assert!(store
        .latest_fragment(&p.project_id, FragmentKind::Component, None)
        .await
        .unwrap()
        .is_none());
    let scoped = store
        .latest_fragment(&p.project_id, FragmentKind::Component, Some(&c.component_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scoped.content, "lexer docs");
}

async fn fragment_for_unknown_project_fails(store: &dyn ComponentStore) {
    let err = store
        .append_fragment(NewFragment {
            project_id: ProjectId::from("ghost"),
            kind: FragmentKind::Usage,
            component_id: None,
            content: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProjectNotFound { .. }));
}

async fn ensure_component_keeps_existing_record(store: &dyn ComponentStore) {
    let p = project(store).await;
    let parser = store
        .upsert_component(
            &p.project_id,
            ComponentUpsert::new("Parser")
                .with_description("Parses tokens")
                .with_dependencies(["Lexer"]),
        )
        .await
        .unwrap();

    let ensured = store.ensure_component(&p.project_id, "Parser").await.unwrap();
    assert_eq!(ensured.component_id, parser.component_id);
    assert_eq!(ensured.description, "Parses tokens");
    assert!(ensured.dependencies.contains("Lexer"));

    let stored = store
        .get_component(&p.project_id, "Parser")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description, "Parses tokens");
    assert_eq!(stored.dependencies.len(), 1);
}

async fn ensure_component_creates_bare_record_once(store: &dyn ComponentStore) {
    let p = project(store).await;

    let first = store.ensure_component(&p.project_id, "Lexer").await.unwrap();
    assert_eq!(first.name, "Lexer");
    assert!(first.description.is_empty());
    assert!(first.dependencies.is_empty());
    assert!(first.metadata.is_empty());

    let second = store.ensure_component(&p.project_id, "Lexer").await.unwrap();
    assert_eq!(second.component_id, first.component_id);

    // A later full upsert fills the placeholder and keeps its id.
    let filled = store
        .upsert_component(
            &p.project_id,
            ComponentUpsert::new("Lexer").with_description("Splits input"),
        )
        .await
        .unwrap();
    assert_eq!(filled.component_id, first.component_id);

    let err = store
        .ensure_component(&ProjectId::from("ghost"), "Lexer")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProjectNotFound { .. }));
    let err = store.ensure_component(&p.project_id, " ").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord { .. }));
}

async fn agent_runs_are_scoped_to_project(store: &dyn ComponentStore) {
    let p = project(store).await;
    let other = store
        .upsert_project("https://github.com/acme/gadgets", "gadgets")
        .await
        .unwrap();

    let run = |project_id: &ProjectId, task_id: &str, success: bool| NewAgentRun {
        project_id: project_id.clone(),
        job_id: "doc_1".to_string(),
        task_id: task_id.to_string(),
        task_type: "architecture".to_string(),
        success,
        error: (!success).then(|| "timeout".to_string()),
        duration_ms: 40,
    };

    let recorded = store
        .record_agent_run(run(&p.project_id, "architecture", true))
        .await
        .unwrap();
    assert!(!recorded.run_id.is_empty());
    store
        .record_agent_run(run(&p.project_id, "usage", false))
        .await
        .unwrap();
    store
        .record_agent_run(run(&other.project_id, "architecture", true))
        .await
        .unwrap();

    let runs = store.list_agent_runs(&p.project_id).await.unwrap();
    assert_eq!(runs.len(), 2);
    let mut tasks: Vec<&str> = runs.iter().map(|r| r.task_id.as_str()).collect();
    tasks.sort();
    assert_eq!(tasks, vec!["architecture", "usage"]);
    let failed = runs.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.error.as_deref(), Some("timeout"));
    assert_eq!(failed.duration_ms, 40);

    let err = store
        .record_agent_run(run(&ProjectId::from("ghost"), "usage", true))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ProjectNotFound { .. }));
}

// ===========================================================================
// MemoryComponentStore
// ===========================================================================

#[tokio::test]
async fn memory_upsert_project_is_get_or_create() {
    upsert_project_is_get_or_create(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_get_project_unknown_is_not_found() {
    get_project_unknown_is_not_found(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_list_projects_sorted_by_name() {
    list_projects_sorted_by_name(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_upsert_component_replaces_attributes() {
    upsert_component_replaces_attributes(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_component_write_for_unknown_project_fails() {
    component_write_for_unknown_project_fails(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_empty_component_name_rejected() {
    empty_component_name_rejected(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_list_components_sorted_and_scoped() {
    list_components_sorted_and_scoped(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_append_fragment_supersedes() {
    append_fragment_supersedes(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_append_identical_content_is_noop() {
    append_identical_content_is_noop(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_fragments_keyed_by_component() {
    fragments_keyed_by_component(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_fragment_for_unknown_project_fails() {
    fragment_for_unknown_project_fails(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_ensure_component_keeps_existing_record() {
    ensure_component_keeps_existing_record(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_ensure_component_creates_bare_record_once() {
    ensure_component_creates_bare_record_once(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_agent_runs_are_scoped_to_project() {
    agent_runs_are_scoped_to_project(&MemoryComponentStore::new()).await;
}

#[tokio::test]
async fn memory_concurrent_ensure_never_clobbers_upsert() {
    let store = Arc::new(MemoryComponentStore::new());
    let p = store.upsert_project(REPO, "widgets").await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let pid = p.project_id.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    store.ensure_component(&pid, "Parser").await.unwrap()
                } else {
                    store
                        .upsert_component(
                            &pid,
                            ComponentUpsert::new("Parser").with_description("Parses tokens"),
                        )
                        .await
                        .unwrap()
                }
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let ids: std::collections::HashSet<_> = results
        .into_iter()
        .map(|r| r.unwrap().component_id)
        .collect();

    assert_eq!(ids.len(), 1);
    let stored = store
        .get_component(&p.project_id, "Parser")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description, "Parses tokens");
}

#[tokio::test]
async fn memory_concurrent_upserts_keep_one_record() {
    let store = Arc::new(MemoryComponentStore::new());
    let p = store.upsert_project(REPO, "widgets").await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let pid = p.project_id.clone();
            tokio::spawn(async move {
                store
                    .upsert_component(
                        &pid,
                        ComponentUpsert::new("Shared").with_description(format!("writer {i}")),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let ids: std::collections::HashSet<_> = results
        .into_iter()
        .map(|r| r.unwrap().component_id)
        .collect();

    assert_eq!(ids.len(), 1);
    let stored = store
        .get_component(&p.project_id, "Shared")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.description.starts_with("writer "));
}

// ===========================================================================
// SurrealComponentStore (mem://)
// ===========================================================================

async fn surreal() -> SurrealComponentStore {
    SurrealComponentStore::in_memory().await.unwrap()
}

#[tokio::test]
async fn surreal_upsert_project_is_get_or_create() {
    upsert_project_is_get_or_create(&surreal().await).await;
}

#[tokio::test]
async fn surreal_get_project_unknown_is_not_found() {
    get_project_unknown_is_not_found(&surreal().await).await;
}

#[tokio::test]
async fn surreal_list_projects_sorted_by_name() {
    list_projects_sorted_by_name(&surreal().await).await;
}

#[tokio::test]
async fn surreal_upsert_component_replaces_attributes() {
    upsert_component_replaces_attributes(&surreal().await).await;
}

#[tokio::test]
async fn surreal_component_write_for_unknown_project_fails() {
    component_write_for_unknown_project_fails(&surreal().await).await;
}

#[tokio::test]
async fn surreal_empty_component_name_rejected() {
    empty_component_name_rejected(&surreal().await).await;
}

#[tokio::test]
async fn surreal_list_components_sorted_and_scoped() {
    list_components_sorted_and_scoped(&surreal().await).await;
}

#[tokio::test]
async fn surreal_append_fragment_supersedes() {
    append_fragment_supersedes(&surreal().await).await;
}

#[tokio::test]
async fn surreal_append_identical_content_is_noop() {
    append_identical_content_is_noop(&surreal().await).await;
}

#[tokio::test]
async fn surreal_fragments_keyed_by_component() {
    fragments_keyed_by_component(&surreal().await).await;
}

#[tokio::test]
async fn surreal_fragment_for_unknown_project_fails() {
    fragment_for_unknown_project_fails(&surreal().await).await;
}

#[tokio::test]
async fn surreal_ensure_component_keeps_existing_record() {
    ensure_component_keeps_existing_record(&surreal().await).await;
}

#[tokio::test]
async fn surreal_ensure_component_creates_bare_record_once() {
    ensure_component_creates_bare_record_once(&surreal().await).await;
}

#[tokio::test]
async fn surreal_agent_runs_are_scoped_to_project() {
    agent_runs_are_scoped_to_project(&surreal().await).await;
}

#[tokio::test]
async fn surreal_connect_initializes_schema() {
    let store = SurrealComponentStore::connect(&StoreConfig::memory())
        .await
        .unwrap();
    let p = store.upsert_project(REPO, "widgets").await.unwrap();
    assert_eq!(store.list_projects().await.unwrap().len(), 1);
    assert!(store.list_agent_runs(&p.project_id).await.unwrap().is_empty());
}
