use crate::record::TraceRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded in-memory buffer between request capture and batch flush.
///
/// Cloning yields another handle to the same buffer. The lock is held only
/// to push a record or to swap the buffer out, so draining never waits on
/// storage and producers never wait on a flush.
#[derive(Debug, Clone, Default)]
pub struct TraceQueue {
    records: Arc<Mutex<Vec<TraceRecord>>>,
}

impl TraceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Never blocks on I/O and never fails.
    pub fn enqueue(&self, record: TraceRecord) {
        self.lock().push(record);
    }

    /// Remove and return everything currently buffered.
    pub fn drain_all(&self) -> Vec<TraceRecord> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a Vec half-pushed, so a
    // poisoned buffer is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<TraceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
