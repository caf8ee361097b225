// src/errors/mod.rs
use std::fmt;

use thiserror::Error;

/// Main error type for pg2parquet operations
#[derive(Error, Debug)]
pub enum Pg2ParquetError {
    #[error("{0}")]
    Config(String),

    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Database query error: {0}")]
    Query(String),

    #[error("Error writing data: {0}")]
    Write(String),

    #[error("Lambda handler error: {0}")]
    Other(String),
}

/// Coarse classification used in log fields; callers of the handler never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Query,
    Write,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Query => "query",
            ErrorKind::Write => "write",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl Pg2ParquetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Pg2ParquetError::Config(_) => ErrorKind::Configuration,
            Pg2ParquetError::Connection(_) => ErrorKind::Connection,
            Pg2ParquetError::Query(_) => ErrorKind::Query,
            Pg2ParquetError::Write(_) => ErrorKind::Write,
            Pg2ParquetError::Other(_) => ErrorKind::Other,
        }
    }

    pub fn missing_var(key: &str) -> Self {
        Pg2ParquetError::Config(format!("Missing required environment variable: '{key}'"))
    }
}

impl From<datafusion::arrow::error::ArrowError> for Pg2ParquetError {
    fn from(e: datafusion::arrow::error::ArrowError) -> Self {
        Pg2ParquetError::Query(format!("arrow: {e}"))
    }
}

impl From<datafusion::parquet::errors::ParquetError> for Pg2ParquetError {
    fn from(e: datafusion::parquet::errors::ParquetError) -> Self {
        Pg2ParquetError::Write(format!("parquet: {e}"))
    }
}

impl From<minijinja::Error> for Pg2ParquetError {
    fn from(e: minijinja::Error) -> Self {
        Pg2ParquetError::Query(format!("SQL template error: {e}"))
    }
}

/// Convenience Result type that uses Pg2ParquetError
pub type Result<T> = std::result::Result<T, Pg2ParquetError>;
