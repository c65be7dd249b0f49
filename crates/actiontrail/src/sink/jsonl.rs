//! JSON Lines file sink.

use super::TraceSink;
use crate::error::Result;
use crate::record::TraceRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Appends each record as one JSON object per line.
///
/// The whole batch is serialized up front and written with a single
/// `write_all`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// Create a sink writing to `path`. Parent directories are created on
    /// the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(records: &[TraceRecord]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(records.len() * 256);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

#[async_trait]
impl TraceSink for JsonLinesSink {
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
        let buf = Self::encode(records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}
