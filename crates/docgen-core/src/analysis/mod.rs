//! Analysis seam.
//!
//! An [`Analyzer`] is the opaque per-agent analysis function: given a task's
//! input and a fetched repository it returns structured data or an error.
//! Production deployments plug a model-backed analyzer in here; the crate
//! ships [`WorkspaceAnalyzer`], a deterministic filesystem heuristic.
//!
//! Output follows the ingestion payload shape:
//!
//! ```text
//! {
//!   "components": [{"name", "description", "dependencies", "metadata"}],
//!   "fragments":  [{"kind", "component", "content"}]
//! }
//! ```

mod workspace;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

pub use workspace::WorkspaceAnalyzer;

/// What an analyzer is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisKind {
    Architecture,
    Component { name: String },
    Usage,
}

/// Input to one analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub repository_root: PathBuf,
    /// Full task input, for analyzers that read extra keys.
    pub input: Map<String, Value>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Produce an analysis payload. Implementations should return early
    /// once `cancel` fires.
    async fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Map<String, Value>>;
}
