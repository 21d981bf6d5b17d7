//! docgen - parallel documentation generation
//!
//! ## Commands
//!
//! - `generate`: run a documentation job over a local checkout
//! - `architecture`: architecture fragment and dependency graph of a project
//! - `search`: rank a project's components against a query
//! - `stats`: component, fragment, dependency and agent-run counts of a project
//! - `runs`: agent runs logged for a project
//! - `projects`: list known projects
//! - `agents`: list registered agent types and their capabilities
//!
//! All commands print JSON on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docgen_core::{
    CapabilityRegistry, DocumentationRequest, EngineConfig, ExportFormat, JobStatus,
    OrchestrationEngine, QueryService, WorkspaceAnalyzer,
};
use docgen_state::{ComponentStore, ProjectId, StoreConfig, SurrealComponentStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "docgen")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel documentation generation over analysis agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Component store connection string (mem://, surrealkv://path, ws(s)://host)
    #[arg(long, global = true, env = "SURREALDB_URL")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documentation for a repository and wait for the job to finish
    Generate {
        /// Local path or file:// URL of the repository
        #[arg(long)]
        repo: String,

        /// Project name
        #[arg(long)]
        project: String,

        /// Component to document in detail (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,

        /// Export format recorded on the job: confluence, markdown or both
        #[arg(long, default_value = "confluence")]
        format: ExportFormat,
    },

    /// Show the architecture view of a project
    Architecture {
        /// Project id
        project_id: String,
    },

    /// Search a project's components
    Search {
        /// Project id
        project_id: String,

        /// Whitespace-separated search terms
        query: String,
    },

    /// Show statistics for a project
    Stats {
        /// Project id
        project_id: String,
    },

    /// List agent runs logged for a project
    Runs {
        /// Project id
        project_id: String,
    },

    /// List known projects
    Projects,

    /// List registered agent types
    Agents {
        /// Only agents supporting this language
        #[arg(long)]
        language: Option<String>,

        /// Only agents whose name or description matches
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    docgen_core::init_tracing(cli.json, level);

    let output = match cli.command {
        Commands::Agents { language, search } => {
            cmd_agents(language.as_deref(), search.as_deref())?
        }
        command => {
            let store = connect(cli.db.as_deref()).await?;
            run_store_command(command, store).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn connect(db: Option<&str>) -> Result<Arc<dyn ComponentStore>> {
    let config = match db {
        Some(url) => StoreConfig::url(url),
        None => StoreConfig::from_env(),
    };
    let store = SurrealComponentStore::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to component store at {}", config.endpoint))?;
    Ok(Arc::new(store))
}

async fn run_store_command(command: Commands, store: Arc<dyn ComponentStore>) -> Result<Value> {
    let query = QueryService::new(store.clone());
    match command {
        Commands::Generate {
            repo,
            project,
            components,
            format,
        } => cmd_generate(store, &repo, &project, components, format).await,
        Commands::Architecture { project_id } => {
            to_json(&query.get_architecture(&ProjectId(project_id)).await?)
        }
        Commands::Search { project_id, query: q } => {
            to_json(&query.search_components(&ProjectId(project_id), &q).await?)
        }
        Commands::Stats { project_id } => {
            to_json(&query.get_statistics(&ProjectId(project_id)).await?)
        }
        Commands::Runs { project_id } => {
            to_json(&query.list_agent_runs(&ProjectId(project_id)).await?)
        }
        Commands::Projects => to_json(&query.list_projects().await?),
        Commands::Agents { language, search } => cmd_agents(language.as_deref(), search.as_deref()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

async fn cmd_generate(
    store: Arc<dyn ComponentStore>,
    repo: &str,
    project: &str,
    components: Vec<String>,
    format: ExportFormat,
) -> Result<Value> {
    let config = EngineConfig::from_env()?;
    let engine = OrchestrationEngine::with_workspace_analyzer(store, config)?;

    let request = DocumentationRequest::new(repo, project)
        .with_components(components)
        .with_export_format(format);
    let job = engine.run(request).await?;

    match job.status {
        JobStatus::Completed => info!(job_id = %job.id, "documentation generated"),
        JobStatus::Partial => warn!(
            job_id = %job.id,
            failed = job.failed(),
            "documentation generated with failed tasks"
        ),
        _ => {
            let reason = job.error.clone().unwrap_or_else(|| "all tasks failed".to_string());
            eprintln!("{}", serde_json::to_string_pretty(&job)?);
            bail!("job {} failed: {}", job.id, reason);
        }
    }
    to_json(&job)
}

fn cmd_agents(language: Option<&str>, search: Option<&str>) -> Result<Value> {
    let registry = CapabilityRegistry::with_builtin_agents(Arc::new(WorkspaceAnalyzer::new()))?;
    let agents = match (language, search) {
        (Some(lang), _) => registry.find_by_language(lang),
        (None, Some(q)) => registry.search(q),
        (None, None) => registry.list(),
    };
    to_json(&agents)
}
