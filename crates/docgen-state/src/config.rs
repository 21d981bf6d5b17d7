//! Connection settings for the SurrealDB component store

/// Credentials for an authenticated SurrealDB endpoint
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

/// Where and how to connect the component store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection string: `mem://`, `surrealkv://<path>`, `ws://` or `wss://`
    pub endpoint: String,
    pub credentials: Option<Credentials>,
    /// Namespace (default: "docgen")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
}

/// Local persistence directory used when nothing else is configured
pub const DEFAULT_LOCAL_PATH: &str = ".docgen/db";

impl StoreConfig {
    /// Configuration for an arbitrary connection string, unauthenticated.
    pub fn url(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            namespace: "docgen".to_string(),
            database: "main".to_string(),
        }
    }

    /// In-memory database; contents are lost on drop.
    pub fn memory() -> Self {
        Self::url("mem://")
    }

    /// Local on-disk database under `path`.
    pub fn local(path: &str) -> Self {
        Self::url(format!("surrealkv://{path}"))
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        is_root: bool,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root,
        });
        self
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Path of a `surrealkv://` endpoint, if that is the scheme in use.
    pub fn local_path(&self) -> Option<&str> {
        self.endpoint.strip_prefix("surrealkv://")
    }

    /// Resolve configuration from the environment.
    ///
    /// Order:
    /// 1. `SURREALDB_ENDPOINT` + `SURREALDB_USERNAME` + `SURREALDB_PASSWORD`
    ///    (with optional `SURREALDB_ROOT`) for an authenticated endpoint
    /// 2. `SURREALDB_URL` for an unauthenticated connection string
    /// 3. local persistence in [`DEFAULT_LOCAL_PATH`]
    ///
    /// `SURREALDB_NAMESPACE` and `SURREALDB_DATABASE` apply to all three.
    pub fn from_env() -> Self {
        let base = match (
            std::env::var("SURREALDB_ENDPOINT"),
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        ) {
            (Ok(endpoint), Ok(username), Ok(password)) => {
                let is_root = std::env::var("SURREALDB_ROOT")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);
                Self::url(endpoint).with_credentials(username, password, is_root)
            }
            _ => match std::env::var("SURREALDB_URL") {
                Ok(url) => Self::url(url),
                Err(_) => Self::local(DEFAULT_LOCAL_PATH),
            },
        };

        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| base.namespace.clone());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| base.database.clone());
        base.with_namespace(namespace).with_database(database)
    }
}
