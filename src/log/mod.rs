use tracing::subscriber::SetGlobalDefaultError;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

pub const LOG_LEVEL_KEY: &str = "PG2PARQUET_LOG_LEVEL";
pub const LOG_FORMAT_KEY: &str = "PG2PARQUET_LOG_FORMAT";

/// `PG2PARQUET_LOG_LEVEL`, then `RUST_LOG`, then `info`.
fn level_filter(level: Option<String>) -> EnvFilter {
    match level {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn wants_json(format: Option<String>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

/// Install the global subscriber. Only the binary calls this; library callers
/// bring their own.
///
/// `PG2PARQUET_LOG_FORMAT=json` emits one JSON object per event for function
/// runtime log collectors. Anything else gets the human-readable format with
/// file and line.
pub fn init_tracing() -> Result<(), SetGlobalDefaultError> {
    let filter = level_filter(std::env::var(LOG_LEVEL_KEY).ok());

    let events = if wants_json(std::env::var(LOG_FORMAT_KEY).ok()) {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing::subscriber::set_global_default(
        Registry::default()
            .with(filter)
            .with(events)
            .with(ErrorLayer::default()),
    )
}
