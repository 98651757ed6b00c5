//! litexplore - query SQLite databases on remote hosts over ssh.

mod cli;

use cli::{Cli, Command};
use litexplore::config::Config;
use litexplore::error::{EngineError, Result};
use litexplore::logging;
use litexplore::query::{QueryExecutor, QueryRequest, RemoteExecutor};
use litexplore::remote::RemoteTarget;
use litexplore::schema::{browse_table, list_tables, ForeignKeyResolver, Identifier, PageRequest};
use serde::Serialize;
use std::io::Write;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let env_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }
    if env_loaded {
        info!("Loaded environment from .env");
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let target = resolve_target(&cli, &config)?;
    info!("Target: {}", target.display_string());

    let executor = QueryExecutor::from_config(&config.engine)?;
    let result = dispatch(&executor, &target, cli.command).await;

    if let Err(e) = executor.shutdown().await {
        warn!("Failed to shut down session: {e}");
    }
    result
}

async fn dispatch(executor: &QueryExecutor, target: &RemoteTarget, command: Command) -> Result<()> {
    match command {
        Command::Probe => {
            let version = executor.probe(target).await?;
            print_json(&serde_json::json!({ "version": version }))
        }
        Command::Tables => {
            for table in list_tables(executor, target).await? {
                print_json(&table)?;
            }
            Ok(())
        }
        Command::Fks { table } => {
            let table = Identifier::new(table)?;
            let refs = ForeignKeyResolver::new(executor).resolve(target, &table).await?;
            for fk in &refs {
                print_json(fk)?;
            }
            Ok(())
        }
        Command::Query { write, params, sql } => {
            let request = QueryRequest::new(sql)
                .with_params(Command::query_params(&params))
                .writable(write);
            let outcome = executor.execute(target, &request).await?;
            if let Some(warning) = outcome.truncation_warning() {
                warn!("{warning}");
            }
            for row in &outcome.rows {
                print_json(row)?;
            }
            Ok(())
        }
        Command::Browse {
            table,
            page,
            page_size,
            filter,
        } => {
            let mut request = PageRequest::new(Identifier::new(table)?)
                .with_page(page)
                .with_page_size(page_size);
            if let Some(filter) = filter {
                request = request.with_filter(filter);
            }
            let page = browse_table(executor, target, &request).await?;
            if page.truncated {
                warn!("Page truncated at {} rows", page.rows.len());
            }
            print_json(&page)
        }
    }
}

/// Resolves the target from CLI args, config file and environment.
///
/// Precedence: CLI arguments, then the named target, then the `default`
/// target, then `LTX_*` environment variables.
fn resolve_target(cli: &Cli, config: &Config) -> Result<RemoteTarget> {
    let mut target = match cli.target_name() {
        Some(name) => config.get_target(Some(name)).cloned().ok_or_else(|| {
            EngineError::configuration(format!("Target '{name}' not found in config file"))
        })?,
        None => config.get_target(None).cloned().unwrap_or_default(),
    };

    if let Some(overrides) = cli.to_target_config() {
        target.merge(&overrides);
    }
    target.apply_env_defaults();

    if target.is_empty() {
        return Err(EngineError::configuration(
            "No remote target configured. Use --host and --database, or --help for usage",
        ));
    }
    target.to_target()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| EngineError::internal(format!("Failed to encode output: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")
        .map_err(|e| EngineError::internal(format!("Failed to write output: {e}")))
}
