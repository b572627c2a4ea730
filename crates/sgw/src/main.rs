//! Helios Search Gateway (SGW)
//!
//! Runs one search request against the configured tenant clusters and prints
//! the JSON response.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use helios_search::config::{GatewayConfig, init_logging};
use helios_search::error::{AuthorizationError, GatewayResult};
use helios_search::query::PolicyService;
use helios_search::tenant::{RequestContext, StaticTenantResolver};
use helios_search::{CursorService, FanoutCoordinator, Query, SearchExecutor};
use tracing::info;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "sgw")]
#[command(about = "Multi-tenant search gateway")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,

    /// Caller identity; owns any cursor the request opens.
    #[arg(long, env = "SGW_USER")]
    user: String,

    /// Comma-separated data partitions to search.
    #[arg(long, env = "SGW_DATA_PARTITION")]
    data_partition: String,

    /// Data groups of the caller. Repeat for several groups.
    #[arg(long = "group")]
    groups: Vec<String>,

    /// Caller may see every document regardless of ACL.
    #[arg(long)]
    full_access: bool,

    /// Collaboration the request is scoped to.
    #[arg(long)]
    collaboration: Option<String>,

    /// File holding a compiled search policy, required when policies are enabled.
    #[arg(long, env = "SGW_POLICY_FILE")]
    policy_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a plain query. The request is a JSON query body.
    Query {
        /// Request file, or `-` for stdin.
        #[arg(default_value = "-")]
        request: String,
    },
    /// Fetch a cursor page. Include `cursor` in the request to resume.
    Cursor {
        /// Request file, or `-` for stdin.
        #[arg(default_value = "-")]
        request: String,
    },
    /// Close a cursor.
    Close {
        /// Cursor token.
        cursor: String,
    },
}

/// Serves a compiled policy read once from a file.
struct FilePolicy {
    compiled: String,
}

#[async_trait]
impl PolicyService for FilePolicy {
    async fn compiled_policy(&self, _ctx: &RequestContext) -> GatewayResult<String> {
        if self.compiled.trim().is_empty() {
            return Err(AuthorizationError::PolicyUnavailable {
                message: "compiled policy is empty".to_string(),
            }
            .into());
        }
        Ok(self.compiled.clone())
    }
}

fn read_request(source: &str) -> anyhow::Result<Query> {
    let query = if source == "-" {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    } else {
        serde_json::from_reader(BufReader::new(File::open(Path::new(source))?))?
    };
    Ok(query)
}

#[cfg(feature = "elasticsearch")]
fn create_engine(config: &GatewayConfig) -> Arc<dyn helios_search::SearchEngine> {
    use helios_search::engine::ElasticsearchEngine;

    info!(max_response_size_mb = config.max_response_size_mb, "Using Elasticsearch engine");
    Arc::new(ElasticsearchEngine::new(config.max_response_size_mb))
}

#[cfg(not(feature = "elasticsearch"))]
compile_error!("sgw requires the 'elasticsearch' feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;
    init_logging(&config.log_level);

    let mut errors = config.validate().err().unwrap_or_default();
    if config.clusters_file.is_none() {
        errors.push("A clusters file is required (--clusters-file)".to_string());
    }
    if config.policy_enabled && cli.policy_file.is_none() {
        errors.push("Policy filtering is enabled but no --policy-file was given".to_string());
    }
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        pagination = %config.pagination,
        cross_tenant = config.cross_tenant_enabled,
        workers = config.fanout_workers(),
        "Starting Helios Search Gateway"
    );

    let resolver = match &config.clusters_file {
        Some(path) => StaticTenantResolver::from_file(path)?,
        None => StaticTenantResolver::new(),
    };
    info!(tenants = resolver.len(), "Loaded tenant clusters");

    let policy = match (&cli.policy_file, config.policy_enabled) {
        (Some(path), true) => Some(std::fs::read_to_string(path)?),
        _ => None,
    };

    let config = Arc::new(config);
    let mut executor = SearchExecutor::new(Arc::clone(&config), create_engine(&config));
    if let Some(compiled) = policy {
        executor = executor.with_policy(Arc::new(FilePolicy { compiled }));
    }
    let cursors = match &config.cursor_cache_file {
        Some(path) => {
            info!(path = %path.display(), "Persisting cursors to file");
            CursorService::with_cache_file(executor.clone(), path)
        }
        None => CursorService::new(executor.clone()),
    };
    let gateway = FanoutCoordinator::new(Arc::new(resolver), executor, cursors);

    let mut ctx = RequestContext::new(cli.user, &cli.data_partition)?
        .with_data_groups(cli.groups)
        .with_full_data_access(cli.full_access);
    if let Some(collaboration) = cli.collaboration {
        ctx = ctx.with_collaboration(collaboration);
    }

    let outcome = match cli.command {
        Command::Query { request } => {
            let query = read_request(&request)?;
            gateway
                .query(&query, &ctx)
                .await
                .map(|response| serde_json::to_string_pretty(&response))
        }
        Command::Cursor { request } => {
            let query = read_request(&request)?;
            gateway
                .cursor_query(&query, &ctx)
                .await
                .map(|response| serde_json::to_string_pretty(&response))
        }
        Command::Close { cursor } => gateway
            .close_cursor(&cursor, &ctx)
            .await
            .map(|()| Ok("{}".to_string())),
    };

    match outcome {
        Ok(body) => {
            println!("{}", body?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} ({}): {}", err.reason(), err.status_code(), err);
            std::process::exit(1);
        }
    }
}
