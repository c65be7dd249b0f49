use crate::error::Result;
use crate::record::TraceRecord;
use async_trait::async_trait;

pub mod jsonl;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Durable storage for trace batches.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Store every record of one flush.
    ///
    /// Called at most once per flush and never with an empty slice.
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()>;
}

#[async_trait]
impl<T: TraceSink + ?Sized> TraceSink for std::sync::Arc<T> {
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
        (**self).insert_batch(records).await
    }
}
