use async_trait::async_trait;
use bytes::Bytes;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::basic::Compression;
use datafusion::parquet::file::properties::{EnabledStatistics, WriterProperties};
use tracing::{debug, info, instrument};

use crate::config::OutputTarget;
use crate::dataset::Dataset;
use crate::errors::{Pg2ParquetError, Result};

pub mod local;
pub mod s3;

pub use local::LocalSink;
pub use s3::S3Sink;

/// Which backend a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Local,
    S3,
}

impl SinkKind {
    pub fn for_target(target: &OutputTarget) -> Self {
        match target {
            OutputTarget::Local { .. } => SinkKind::Local,
            OutputTarget::S3 { .. } => SinkKind::S3,
        }
    }
}

/// Stores one encoded Parquet file, replacing whatever was there.
#[async_trait]
pub trait DatasetSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn put(&self, target: &OutputTarget, body: Bytes) -> Result<()>;
}

/// Picks the sink for a target. Only the backend matching the target is built.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn sink_for(&self, target: &OutputTarget) -> Result<Box<dyn DatasetSink>>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultSinks;

#[async_trait]
impl SinkFactory for DefaultSinks {
    async fn sink_for(&self, target: &OutputTarget) -> Result<Box<dyn DatasetSink>> {
        match target {
            OutputTarget::Local { .. } => Ok(Box::new(LocalSink)),
            OutputTarget::S3 { .. } => Ok(Box::new(S3Sink::from_env().await)),
        }
    }
}

//=============== Parquet Encoding ============================================//

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_max_row_group_size(100_000)
        .build()
}

/// Encode the whole dataset as one Parquet file. Arrow has no row index, so
/// none is written.
pub fn encode_parquet(dataset: &Dataset) -> Result<Bytes> {
    let mut writer = ArrowWriter::try_new(Vec::new(), dataset.schema(), Some(writer_properties()))?;
    for batch in dataset.batches() {
        writer.write(batch)?;
    }
    let buf = writer.into_inner()?;
    Ok(Bytes::from(buf))
}

/// Encode then hand to the sink for `target`.
#[instrument(skip_all, fields(dest = %target.uri()))]
pub async fn write_dataset(
    dataset: &Dataset,
    target: &OutputTarget,
    sinks: &dyn SinkFactory,
) -> Result<()> {
    info!("writing result");
    let body = encode_parquet(dataset)?;
    debug!(bytes = body.len(), "encoded parquet");

    let sink = sinks.sink_for(target).await?;
    if sink.kind() != SinkKind::for_target(target) {
        return Err(Pg2ParquetError::Write(format!(
            "sink {:?} cannot write to {}",
            sink.kind(),
            target.uri()
        )));
    }
    sink.put(target, body).await?;

    info!(rows = dataset.num_rows(), "result written to {}", target.uri());
    Ok(())
}
