//! Postgres-to-Parquet export.
//!
//! One invocation resolves settings from the environment, runs a single SQL query
//! (a four-way join by default, see `sql/artifacts.sql`), materializes the rows as
//! Arrow batches and stores them as one Parquet file: on S3 in `production`, on local
//! disk in `staging`.

pub mod cmd;
pub mod config;
pub mod dataset;
pub mod db;
pub mod errors;
pub mod log;
pub mod pipeline;
pub mod writer;

pub use errors::{Pg2ParquetError, Result};
pub use pipeline::{handler, InvocationContext, InvocationResult, Pipeline};
