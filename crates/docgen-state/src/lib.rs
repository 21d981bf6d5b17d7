//! docgen-state: component store for docgen
//!
//! Persists what the documentation agents produce and serves it back to
//! query tooling.
//!
//! ## Key Components
//!
//! - `ComponentStore`: async, backend-agnostic store contract
//! - `NewAgentRun` / `AgentRunRecord`: append-only ledger of agent task outcomes
//! - `MemoryComponentStore`: in-process implementation
//! - `SurrealComponentStore`: SurrealDB implementation (`mem://`, `surrealkv://`, `ws(s)://`)

pub mod config;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use config::{Credentials, StoreConfig};
pub use error::StorageError;
pub use fakes::MemoryComponentStore;
pub use storage_traits::{
    component_key, fragment_key, project_key, AgentRunRecord, ComponentId, ComponentRecord,
    ComponentStore, ComponentUpsert, ContentDigest, FragmentKind, FragmentRecord, NewAgentRun,
    NewFragment, ProjectId, ProjectRecord, StorageResult,
};
pub use surreal_store::SurrealComponentStore;
