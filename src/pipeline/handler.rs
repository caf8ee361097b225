use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::env_lookup;
use crate::db::PgConnector;
use crate::errors::{Pg2ParquetError, Result};
use crate::pipeline::{Pipeline, Report};
use crate::writer::DefaultSinks;

pub const SUCCESS_MESSAGE: &str = "Success";
pub const STATUS_OK: u16 = 200;
pub const STATUS_ERROR: u16 = 500;

/// Response record: `{"statusCode": .., "body": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResult {
    /// Body is the JSON string `"Success"`, quotes included.
    pub fn success() -> Self {
        Self {
            status_code: STATUS_OK,
            body: Value::from(SUCCESS_MESSAGE).to_string(),
        }
    }

    pub fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            status_code: STATUS_ERROR,
            body: format!("Error: {message}"),
        }
    }

    pub fn from_outcome(outcome: Result<Report>) -> Self {
        match outcome {
            Ok(report) => {
                info!(
                    rows = report.rows,
                    columns = report.columns,
                    dest = %report.destination,
                    elapsed_ms = report.elapsed_ms,
                    "invocation succeeded"
                );
                Self::success()
            }
            Err(e) => handle_error(&e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Log the error with its kind and turn it into a 500 response.
pub fn handle_error(err: &Pg2ParquetError) -> InvocationResult {
    error!(kind = %err.kind(), "Error: {err}");
    InvocationResult::failure(err)
}

/// Runtime metadata handed over with the event. Only logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
}

/// Function entry point. `event` and `context` are not inspected.
pub async fn handler(event: Value, context: InvocationContext) -> InvocationResult {
    handle_with(event, context, env_lookup).await
}

/// Same as [`handler`] but settings come from `lookup`.
pub async fn handle_with<L>(event: Value, context: InvocationContext, lookup: L) -> InvocationResult
where
    L: Fn(&str) -> Option<String>,
{
    info!(request_id = ?context.request_id, "starting Postgres2Parquet function");
    debug!(%event, ?context, "invocation input");
    Pipeline::new(PgConnector::new(), DefaultSinks)
        .invoke(lookup)
        .await
}
