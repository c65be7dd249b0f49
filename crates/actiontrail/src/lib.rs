//! In-process audit trail for HTTP APIs
//!
//! Requests pass a [`RouteFilter`] gate, are turned into redacted
//! [`TraceRecord`]s by a [`TraceCollector`] after the response is sent, wait
//! in a [`TraceQueue`] and are written in batches to a [`TraceSink`] by a
//! [`BatchFlusher`].
//!
//! ```rust,ignore
//! use actiontrail::{pipeline, InMemorySink, TraceConfig, TraceLayer};
//!
//! let config = TraceConfig::from_env()?;
//! let (collector, flusher) = pipeline(InMemorySink::new());
//! let scheduler = flusher.spawn(config.flush_interval());
//!
//! let service = tower::ServiceBuilder::new()
//!     .layer(TraceLayer::new(collector))
//!     .service(app);
//! // ...
//! scheduler.shutdown().await;
//! ```

pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod flusher;
pub mod hooks;
pub mod layer;
pub mod queue;
pub mod record;
pub mod redact;
pub mod route_filter;
pub mod sink;

pub use collector::{PendingTrace, TraceCollector};
pub use config::TraceConfig;
pub use context::{Identity, RequestContext, ResponseContext, TraceRoute};
pub use error::{Result, TraceError};
pub use flusher::{BatchFlusher, FlushOutcome, FlushScheduler};
pub use hooks::{HookedBody, PostResponseHooks};
pub use layer::{TraceBody, TraceLayer, TraceService};
pub use queue::TraceQueue;
pub use record::{Parameters, TraceRecord};
pub use redact::{redact, Redactor, HIDDEN, SENSITIVE_KEYS};
pub use route_filter::{MethodSet, RouteFilter, RouteMatcher, RouteRule};
pub use sink::jsonl::JsonLinesSink;
pub use sink::memory::InMemorySink;
#[cfg(feature = "postgres")]
pub use sink::postgres::PostgresSink;
pub use sink::TraceSink;

/// Build a collector and a flusher sharing one fresh queue.
pub fn pipeline<S: TraceSink + 'static>(sink: S) -> (TraceCollector, BatchFlusher) {
    let queue = TraceQueue::new();
    (
        TraceCollector::new(queue.clone()),
        BatchFlusher::new(queue, sink),
    )
}
