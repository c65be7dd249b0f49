use crate::queue::TraceQueue;
use crate::sink::TraceSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Result of one flush, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; storage was not called.
    Empty,
    /// This many records were written in one batch.
    Written(usize),
    /// The write failed and this many records were discarded.
    Dropped(usize),
}

/// Drains a [`TraceQueue`] into a [`TraceSink`].
#[derive(Clone)]
pub struct BatchFlusher {
    queue: TraceQueue,
    sink: Arc<dyn TraceSink>,
}

impl BatchFlusher {
    pub fn new<S: TraceSink + 'static>(queue: TraceQueue, sink: S) -> Self {
        Self {
            queue,
            sink: Arc::new(sink),
        }
    }

    pub fn queue(&self) -> &TraceQueue {
        &self.queue
    }

    /// Write everything buffered in one batch.
    ///
    /// Failures are logged and the drained records discarded; nothing is
    /// requeued and no error reaches the caller.
    pub async fn flush(&self) -> FlushOutcome {
        let records = self.queue.drain_all();
        if records.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = records.len();
        match self.sink.insert_batch(&records).await {
            Ok(()) => {
                tracing::debug!(count, "Flushed trace batch");
                FlushOutcome::Written(count)
            }
            Err(e) => {
                tracing::error!(count, error = %e, "Trace batch write failed, dropping batch");
                FlushOutcome::Dropped(count)
            }
        }
    }

    /// Flush every `period` on a background task.
    ///
    /// The first flush happens one full period after the call. Each flush is
    /// awaited before the next tick, and ticks missed during a slow write are
    /// skipped rather than replayed. Dropping the returned handle detaches the
    /// task instead of stopping it.
    pub fn spawn(self, period: Duration) -> FlushScheduler {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut detached = false;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.flush().await;
                    }
                    changed = shutdown_rx.changed(), if !detached => {
                        if changed.is_err() {
                            // Handle dropped: keep flushing for the life of the runtime.
                            detached = true;
                            continue;
                        }
                        break;
                    }
                }
            }

            // Final drain so a graceful shutdown keeps what is buffered.
            self.flush().await
        });

        FlushScheduler {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

impl std::fmt::Debug for BatchFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFlusher")
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Handle to the periodic flush task.
#[derive(Debug)]
pub struct FlushScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<FlushOutcome>,
}

impl FlushScheduler {
    /// Stop the loop and run one last flush.
    pub async fn shutdown(self) -> FlushOutcome {
        let _ = self.shutdown.send(true);
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Flush scheduler task failed");
                FlushOutcome::Empty
            }
        }
    }

    /// Stop immediately without a final flush.
    pub fn abort(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TraceError};
    use crate::record::TraceRecord;
    use crate::sink::memory::InMemorySink;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(user_id: i64) -> TraceRecord {
        TraceRecord::new(user_id, "test", "POST", "/items", "/items")
    }

    #[derive(Default)]
    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TraceSink for FailingSink {
        async fn insert_batch(&self, _records: &[TraceRecord]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TraceError::Sink("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_flush_skips_storage() {
        let sink = InMemorySink::new();
        let flusher = BatchFlusher::new(TraceQueue::new(), sink.clone());

        assert_eq!(flusher.flush().await, FlushOutcome::Empty);
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_drops_batch() {
        let sink = Arc::new(FailingSink::default());
        let queue = TraceQueue::new();
        let flusher = BatchFlusher::new(queue.clone(), sink.clone());

        queue.enqueue(record(1));
        queue.enqueue(record(2));

        assert_eq!(flusher.flush().await, FlushOutcome::Dropped(2));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());

        // Nothing was requeued, so the next flush has nothing to write.
        assert_eq!(flusher.flush().await, FlushOutcome::Empty);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_flushes_each_period() {
        let sink = InMemorySink::new();
        let queue = TraceQueue::new();
        let scheduler = BatchFlusher::new(queue.clone(), sink.clone()).spawn(Duration::from_secs(60));

        queue.enqueue(record(1));
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.batch_count(), 0);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.batch_count(), 1);

        queue.enqueue(record(2));
        queue.enqueue(record(3));
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.batch_count(), 2);
        assert_eq!(sink.batches()[1].len(), 2);

        // Empty periods do not touch storage.
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.batch_count(), 2);

        assert_eq!(scheduler.shutdown().await, FlushOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_remaining_records() {
        let sink = InMemorySink::new();
        let queue = TraceQueue::new();
        let scheduler = BatchFlusher::new(queue.clone(), sink.clone()).spawn(Duration::from_secs(60));

        queue.enqueue(record(1));
        assert_eq!(scheduler.shutdown().await, FlushOutcome::Written(1));
        assert_eq!(sink.records().len(), 1);
    }

    /// Fails its first write, then stores batches in memory.
    #[derive(Default)]
    struct RecoveringSink {
        calls: AtomicUsize,
        stored: InMemorySink,
    }

    #[async_trait]
    impl TraceSink for RecoveringSink {
        async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TraceError::Sink("connection reset".to_string()));
            }
            self.stored.insert_batch(records).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_failed_write() {
        let sink = Arc::new(RecoveringSink::default());
        let queue = TraceQueue::new();
        let scheduler = BatchFlusher::new(queue.clone(), sink.clone()).spawn(Duration::from_secs(60));

        queue.enqueue(record(1));
        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.stored.batch_count(), 0);
        assert!(queue.is_empty());

        queue.enqueue(record(2));
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.stored.batch_count(), 1);
        assert_eq!(sink.stored.records()[0].user_id, 2);

        assert_eq!(scheduler.shutdown().await, FlushOutcome::Empty);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// K queued records produce exactly one storage call carrying all K.
        #[test]
        fn prop_flush_writes_one_batch(count in 1usize..50) {
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let sink = InMemorySink::new();
                let queue = TraceQueue::new();
                let flusher = BatchFlusher::new(queue.clone(), sink.clone());

                for i in 0..count {
                    queue.enqueue(record(i as i64));
                }

                prop_assert_eq!(flusher.flush().await, FlushOutcome::Written(count));
                prop_assert_eq!(sink.batch_count(), 1);
                prop_assert_eq!(sink.batches()[0].len(), count);
                prop_assert!(queue.is_empty());

                Ok(())
            })?;
        }
    }
}
