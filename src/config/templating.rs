use std::io::ErrorKind;
use std::path::Path;

use minijinja::{context, Environment};
use tracing::{debug, instrument};

use crate::config::Mode;
use crate::errors::{Pg2ParquetError, Result};

/// Read the SQL file and render it with `mode` and `environment` in scope.
///
/// Plain SQL without template syntax comes back unchanged, so
/// `{% if mode == "secondary" %} LIMIT 100 {% endif %}` is optional sugar.
#[instrument(skip_all, fields(path = %path.as_ref().display(), %mode))]
pub fn load_query(path: impl AsRef<Path>, mode: Mode) -> Result<String> {
    let source = std::fs::read_to_string(path.as_ref()).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Pg2ParquetError::Query(format!("SQL query file not found: {e}")),
        _ => Pg2ParquetError::Query(format!("Error reading SQL query file: {e}")),
    })?;

    let sql = render_query(&source, mode)?;
    debug!(bytes = sql.len(), "rendered sql");
    Ok(sql)
}

pub fn render_query(source: &str, mode: Mode) -> Result<String> {
    let env = Environment::new();
    let sql = env.render_str(
        source,
        context! {
            mode => mode.to_string(),
            environment => mode.environment(),
        },
    )?;

    if sql.trim().is_empty() {
        return Err(Pg2ParquetError::Query("SQL query file is empty".into()));
    }
    Ok(sql)
}
