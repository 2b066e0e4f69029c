//! codegraph-cli: CLI entry point for the codegraph indexing engine.

mod commands_doctor;
mod commands_index;
mod commands_query;

use clap::{Parser, Subcommand};
use codegraph_core::CodegraphConfig;
use codegraph_engine::Request;
use codegraph_storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "codegraph",
    about = "Incremental code graph indexer for Python and Rust source trees"
)]
#[command(version, propagate_version = true)]
struct Cli {
    /// Config file (defaults to ~/.codegraph/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a source tree (incremental on re-runs)
    Index {
        /// Root to index (defaults to current directory)
        path: Option<PathBuf>,

        /// Worker threads (overrides the config file)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Record the tree as a dependency rather than a first-party repository
        #[arg(long)]
        dependency: bool,
    },

    /// Index a source tree, then keep the graph in step with file changes
    Watch {
        /// Root to watch (defaults to current directory)
        path: Option<PathBuf>,

        /// Also answer JSON context requests on stdin
        #[arg(long)]
        serve: bool,
    },

    /// Query the graph
    Query {
        #[command(subcommand)]
        intent: QueryIntent,
    },

    /// Show graph statistics and store health
    Status,

    /// List indexed repositories
    Repos,

    /// Answer newline-delimited JSON context requests on stdin
    Serve,

    /// Check configuration and store health
    Doctor,

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum QueryIntent {
    /// Where a symbol is defined (qualified name, simple name or node id)
    Definition { target: String },
    /// Functions and methods calling a symbol
    Callers { target: String },
    /// What a function or method calls
    Callees { target: String },
    /// Direct and transitive imports of a module
    Imports { module: String },
    /// Members of a module or class
    Contains { target: String },
    /// Substring search over symbol names
    Search {
        pattern: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

impl From<QueryIntent> for Request {
    fn from(intent: QueryIntent) -> Self {
        match intent {
            QueryIntent::Definition { target } => Request::Definition { target },
            QueryIntent::Callers { target } => Request::Callers { target },
            QueryIntent::Callees { target } => Request::Callees { target },
            QueryIntent::Imports { module } => Request::Imports { module },
            QueryIntent::Contains { target } => Request::Contains { target },
            QueryIntent::Search { pattern, limit } => Request::Search { pattern, limit },
        }
    }
}

fn main() -> anyhow::Result<()> {
    // stdout is reserved for results (JSON lines in serve mode)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codegraph=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Doctor = cli.command {
        return commands_doctor::cmd_doctor(cli.config.as_deref(), cli.db.as_deref());
    }

    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;

    match cli.command {
        Commands::Index {
            path,
            workers,
            dependency,
        } => {
            let root = root_or_cwd(path)?;
            let mut config = config;
            if let Some(workers) = workers {
                config.index.workers = workers;
                config.validate()?;
            }
            commands_index::cmd_index(&config, &root, dependency)?;
        }
        Commands::Watch { path, serve } => {
            let root = root_or_cwd(path)?;
            commands_index::cmd_watch(&config, &root, serve)?;
        }
        Commands::Query { intent } => {
            commands_query::cmd_query(&config, intent.into())?;
        }
        Commands::Status => {
            commands_query::cmd_query(&config, Request::Status)?;
        }
        Commands::Repos => {
            commands_query::cmd_query(&config, Request::ListRepositories)?;
        }
        Commands::Serve => {
            commands_query::cmd_serve(&config)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {}
    }

    Ok(())
}

// ── Helpers (shared across modules) ────────────────────────────────────────

/// Load the config file (or defaults), apply environment and CLI overrides,
/// and reject fatal configuration errors.
pub(crate) fn load_config(
    path: Option<&std::path::Path>,
    db: Option<&std::path::Path>,
) -> anyhow::Result<CodegraphConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = CodegraphConfig::load(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => CodegraphConfig::load_or_default()?,
    };
    if let Some(db) = db {
        config.storage.db_path = db.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn open_store(config: &CodegraphConfig) -> anyhow::Result<Arc<Storage>> {
    let path = PathBuf::from(&config.storage.db_path);
    let storage = Storage::open_with_config(&path, &config.storage)?;
    tracing::debug!("Opened store at {}", path.display());
    Ok(Arc::new(storage))
}

fn root_or_cwd(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let root = match path {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        anyhow::bail!("Not a directory: {}", root.display());
    }
    Ok(root.canonicalize()?)
}
