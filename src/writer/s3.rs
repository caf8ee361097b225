use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::StorageClass;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::debug;

use crate::config::OutputTarget;
use crate::errors::{Pg2ParquetError, Result};
use crate::writer::{DatasetSink, SinkKind};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Cheapest class that still serves reads without a restore step.
pub fn storage_class() -> StorageClass {
    StorageClass::IntelligentTiering
}

/// Single-object PUT to S3. Not partitioned; an existing key is replaced.
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: S3Client,
}

impl S3Sink {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Region and credentials come from the default AWS provider chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(S3Client::new(&config))
    }
}

#[async_trait]
impl DatasetSink for S3Sink {
    fn kind(&self) -> SinkKind {
        SinkKind::S3
    }

    async fn put(&self, target: &OutputTarget, body: Bytes) -> Result<()> {
        let OutputTarget::S3 { bucket, key } = target else {
            return Err(Pg2ParquetError::Write(format!(
                "s3 sink cannot write to {}",
                target.uri()
            )));
        };

        debug!(%bucket, %key, bytes = body.len(), "put object");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(PARQUET_CONTENT_TYPE)
            .storage_class(storage_class())
            .send()
            .await
            .map_err(|e| {
                let msg = DisplayErrorContext(&e).to_string();
                debug!(%bucket, %key, "put object failed: {msg}");
                Pg2ParquetError::Write(msg)
            })?;
        Ok(())
    }
}
