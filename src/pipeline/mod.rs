use std::fmt;
use std::time::Instant;

use tracing::{info, info_span, instrument, warn, Instrument};

use crate::config::templating::load_query;
use crate::config::Settings;
use crate::db::{Connector, PgConnector, Session};
use crate::errors::Result;
use crate::writer::{write_dataset, DefaultSinks, SinkFactory};

pub mod handler;

pub use handler::{handle_error, handle_with, handler, InvocationContext, InvocationResult};

/// Where an invocation got to. Any stage can fall through to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ConfigResolved,
    Connected,
    Queried,
    Written,
    Success,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::ConfigResolved => "config_resolved",
            Stage::Connected => "connected",
            Stage::Queried => "queried",
            Stage::Written => "written",
            Stage::Success => "success",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub rows: usize,
    pub columns: usize,
    pub destination: String,
    pub elapsed_ms: u64,
}

/// load sql → connect → query → write, with the session always closed.
pub struct Pipeline<C = PgConnector, F = DefaultSinks> {
    connector: C,
    sinks: F,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PgConnector::new(), DefaultSinks)
    }
}

impl<C: Connector, F: SinkFactory> Pipeline<C, F> {
    pub fn new(connector: C, sinks: F) -> Self {
        Self { connector, sinks }
    }

    /// Resolve settings from `lookup`, run, and convert to the response shape.
    pub async fn invoke<L>(&self, lookup: L) -> InvocationResult
    where
        L: Fn(&str) -> Option<String>,
    {
        let outcome = async {
            info!(stage = %Stage::Start, "starting postgres2parquet");
            let settings = Settings::resolve(lookup)?;
            self.run(&settings).await
        }
        .instrument(info_span!("invocation"))
        .await;

        InvocationResult::from_outcome(outcome)
    }

    #[instrument(skip_all, fields(mode = %settings.mode, dest = %settings.output.uri()))]
    pub async fn run(&self, settings: &Settings) -> Result<Report> {
        let t0 = Instant::now();
        let mut stage = Stage::ConfigResolved;
        info!(%stage, "settings resolved");

        let result = self.run_stages(settings, &mut stage).await;
        match &result {
            Ok(_) => {
                stage = Stage::Success;
                info!(%stage, "postgres2parquet complete");
            }
            Err(e) => {
                let reached = stage;
                stage = Stage::Failed;
                warn!(%stage, %reached, kind = %e.kind(), "invocation failed");
            }
        }

        result.map(|(rows, columns)| Report {
            rows,
            columns,
            destination: settings.output.uri(),
            elapsed_ms: t0.elapsed().as_millis() as u64,
        })
    }

    async fn run_stages(&self, settings: &Settings, stage: &mut Stage) -> Result<(usize, usize)> {
        // Read before connecting: a bad file should not cost a connection.
        let sql = load_query(&settings.query_file, settings.mode)?;

        let mut session = self.connector.connect(&settings.connection).await?;
        *stage = Stage::Connected;
        info!(stage = %*stage, "session opened");

        let outcome = self.query_and_write(session.as_mut(), &sql, settings, stage).await;
        let closed = session.close().await;

        match (outcome, closed) {
            (Ok(counts), Ok(())) => Ok(counts),
            (Ok(counts), Err(e)) => {
                warn!("closing database connection failed after write: {e}");
                Ok(counts)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("closing database connection failed: {close_err}");
                Err(e)
            }
        }
    }

    async fn query_and_write(
        &self,
        session: &mut dyn Session,
        sql: &str,
        settings: &Settings,
        stage: &mut Stage,
    ) -> Result<(usize, usize)> {
        let dataset = session.query(sql).await?;
        *stage = Stage::Queried;
        info!(stage = %*stage, rows = dataset.num_rows(), "query done");

        write_dataset(&dataset, &settings.output, &self.sinks).await?;
        *stage = Stage::Written;
        info!(stage = %*stage, "dataset stored");

        Ok((dataset.num_rows(), dataset.num_columns()))
    }
}
