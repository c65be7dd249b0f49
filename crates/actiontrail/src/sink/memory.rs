use super::TraceSink;
use crate::error::{Result, TraceError};
use crate::record::TraceRecord;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Keeps every inserted batch in memory (not persistent, for testing/dev).
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    batches: Arc<Mutex<Vec<Vec<TraceRecord>>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch received so far, in insertion order.
    pub fn batches(&self) -> Vec<Vec<TraceRecord>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// All stored records, flattened.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.batches().into_iter().flatten().collect()
    }

    /// Number of `insert_batch` calls received.
    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TraceSink for InMemorySink {
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| TraceError::Sink("Lock poisoned".to_string()))?;
        batches.push(records.to_vec());
        Ok(())
    }
}
