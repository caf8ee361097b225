use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::OutputTarget;
use crate::errors::{Pg2ParquetError, Result};
use crate::writer::{DatasetSink, SinkKind};

/// Writes to the local filesystem, overwriting any existing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSink;

#[async_trait]
impl DatasetSink for LocalSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Local
    }

    async fn put(&self, target: &OutputTarget, body: Bytes) -> Result<()> {
        let OutputTarget::Local { path } = target else {
            return Err(Pg2ParquetError::Write(format!(
                "local sink cannot write to {}",
                target.uri()
            )));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Pg2ParquetError::Write(format!("{}: {e}", parent.display())))?;
        }

        debug!(path = %path.display(), bytes = body.len(), "writing local file");
        tokio::fs::write(path, &body)
            .await
            .map_err(|e| Pg2ParquetError::Write(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}
