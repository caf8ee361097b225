use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{env_lookup, QUERY_FILE_KEY};
use crate::log::init_tracing;
use crate::pipeline::{handle_with, InvocationContext, InvocationResult};

/// CLI
#[derive(Parser, Debug)]
#[command(
    name = "pg2parquet-run",
    version,
    about = "Run the Postgres-to-Parquet export once, locally.",
    long_about = "Run the Postgres-to-Parquet export once, locally.\n\
Reads ENVIRONMENT (production|staging) and the per-mode DB_* settings, runs the SQL file,\n\
and writes one Parquet file to S3_PATH (production) or LOCAL_PATH (staging).\n\n\
Prints the invocation result as JSON and exits non-zero on failure."
)]
pub struct Cli {
    /// JSON event payload handed to the handler. Missing file means a null event.
    #[arg(long = "event", short = 'e', value_name = "FILE", default_value = "test_event.json")]
    pub event: PathBuf,

    /// SQL file to run; overrides SQL_QUERY_FILE.
    #[arg(long = "query-file", short = 'q', value_name = "FILE")]
    pub query_file: Option<PathBuf>,

    /// dotenv file loaded before resolving settings; ignored when absent.
    #[arg(long = "env-file", value_name = "FILE", default_value = ".env")]
    pub env_file: PathBuf,
}

/// Returns whether a file was loaded. Already-set variables win.
pub fn load_env_file(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(path).with_context(|| format!("loading {}", path.display()))?;
    Ok(true)
}

/// Load the env file, then install logging, so `PG2PARQUET_LOG_*` may come
/// from the file.
pub fn bootstrap(cli: &Cli) -> anyhow::Result<()> {
    let loaded = load_env_file(&cli.env_file)?;
    init_tracing()?;
    if loaded {
        info!(path = %cli.env_file.display(), "loaded env file");
    } else {
        debug!(path = %cli.env_file.display(), "no env file");
    }
    Ok(())
}

pub fn load_event(path: &Path) -> anyhow::Result<Value> {
    if !path.exists() {
        warn!(path = %path.display(), "event file not found, using null event");
        return Ok(Value::Null);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading event {}", path.display()))?;
    let event = serde_json::from_str(&raw)
        .with_context(|| format!("parsing event {}", path.display()))?;
    Ok(event)
}

#[instrument(skip_all)]
pub async fn run(cli: Cli) -> anyhow::Result<InvocationResult> {
    let event = load_event(&cli.event)?;
    let context = InvocationContext {
        request_id: None,
        function_name: Some("pg2parquet-run".to_string()),
    };

    let query_override = cli.query_file.map(|p| p.display().to_string());
    let lookup = move |key: &str| match (&query_override, key) {
        (Some(path), QUERY_FILE_KEY) => Some(path.clone()),
        _ => env_lookup(key),
    };

    Ok(handle_with(event, context, lookup).await)
}
