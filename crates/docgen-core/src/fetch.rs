//! Repository fetch seam.
//!
//! A [`RepositoryFetcher`] turns a repository URL into a local filesystem
//! root. Cloning remote repositories is left to external fetchers; the
//! built-in [`LocalFetcher`] accepts local paths and `file://` URLs.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported repository url: {url}")]
    Unsupported { url: String },

    #[error("repository not found at {path}")]
    NotFound { path: String },

    #[error("repository fetch failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Resolve `repo_url` to a local directory.
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf, FetchError>;
}

/// Fetcher for repositories that are already on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

const REMOTE_SCHEMES: [&str; 5] = ["http://", "https://", "ssh://", "git://", "git@"];

#[async_trait]
impl RepositoryFetcher for LocalFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf, FetchError> {
        if REMOTE_SCHEMES.iter().any(|s| repo_url.starts_with(s)) {
            return Err(FetchError::Unsupported {
                url: repo_url.to_string(),
            });
        }

        let path = repo_url.strip_prefix("file://").unwrap_or(repo_url);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| FetchError::NotFound {
                path: path.to_string(),
            })?;
        if !metadata.is_dir() {
            return Err(FetchError::NotFound {
                path: path.to_string(),
            });
        }

        let root = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| FetchError::Failed(format!("{path}: {e}")))?;
        debug!(root = %root.display(), "repository resolved locally");
        Ok(root)
    }
}
