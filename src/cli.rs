//! Command-line argument parsing for litexplore.

use clap::{Parser, Subcommand};
use litexplore::config::TargetConfig;
use litexplore::query::{param_key, QueryParams};
use litexplore::types::Value;
use std::path::PathBuf;

/// Query SQLite databases on remote hosts over ssh.
#[derive(Parser, Debug)]
#[command(name = "litexplore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// ssh host or alias
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Database path on the remote host
    #[arg(short = 'd', long, value_name = "PATH")]
    pub database: Option<String>,

    /// sqlite3 binary on the remote host
    #[arg(short = 'b', long, value_name = "BIN")]
    pub binary: Option<String>,

    /// Use named target from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub target: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check that the remote sqlite3 supports JSON output
    Probe,

    /// List tables and views
    Tables,

    /// Show the foreign keys of a table
    Fks {
        /// Table name
        table: String,
    },

    /// Run SQL and print the rows
    Query {
        /// Open the database read-write
        #[arg(long)]
        write: bool,

        /// Bind a parameter, e.g. `-p id=42`
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// SQL text
        sql: String,
    },

    /// Print one page of a table with its foreign key links
    Browse {
        /// Table name
        table: String,

        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Rows per page
        #[arg(long, default_value_t = litexplore::schema::DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Filter condition, e.g. `[id] > 10`
        #[arg(long = "where", value_name = "EXPR")]
        filter: Option<String>,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Converts target arguments to a TargetConfig, if any were given.
    pub fn to_target_config(&self) -> Option<TargetConfig> {
        let config = TargetConfig {
            host: self.host.clone(),
            database: self.database.clone(),
            binary: self.binary.clone(),
        };
        (config != TargetConfig::default()).then_some(config)
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(litexplore::config::Config::default_path)
    }

    /// Returns the named target to use, if specified.
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

impl Command {
    /// Collects `query` parameters into a map. Later duplicates win, and
    /// `id` and `:id` count as the same name.
    pub fn query_params(params: &[(String, Value)]) -> QueryParams {
        params
            .iter()
            .map(|(name, value)| (param_key(name).to_string(), value.clone()))
            .collect()
    }
}

/// Parses `name=value`, inferring integer, real and null values.
///
/// Anything else is text. Quote-free on purpose: `-p name=O'Brien` binds
/// the text `O'Brien`.
fn parse_param(arg: &str) -> Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{arg}'. Expected NAME=VALUE"))?;
    if name.is_empty() {
        return Err(format!("Invalid parameter '{arg}'. Name is empty"));
    }

    let value = if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(n) = raw.parse::<i64>() {
        Value::Integer(n)
    } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    };
    Ok((name.to_string(), value))
}
