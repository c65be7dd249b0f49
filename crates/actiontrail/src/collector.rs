//! Per-request capture.
//!
//! [`TraceCollector::capture`] runs in two halves. [`prepare`] applies the
//! route gate, resolves the caller and parses and redacts the body; it is the
//! only part that can fail. [`commit`] stamps the response status and capture
//! time and enqueues the record. Middleware runs `prepare` before the handler
//! and schedules `commit` as a post-response hook.
//!
//! [`prepare`]: TraceCollector::prepare
//! [`commit`]: TraceCollector::commit

use crate::context::{Identity, RequestContext, ResponseContext};
use crate::error::{Result, TraceError};
use crate::queue::TraceQueue;
use crate::record::{Parameters, TraceRecord};
use crate::redact::Redactor;
use crate::route_filter::RouteFilter;
use serde_json::Value;
use std::sync::Arc;

/// A request that passed the gate and is waiting for its response status.
#[derive(Debug, Clone)]
pub struct PendingTrace {
    user_id: i64,
    action: String,
    method: String,
    path_format: String,
    endpoint: String,
    payload: Option<Value>,
    parameters: Option<Parameters>,
}

impl PendingTrace {
    /// Complete the record with the response status, stamped now.
    pub fn finish(self, response: &ResponseContext) -> TraceRecord {
        TraceRecord::new(
            self.user_id,
            self.action,
            self.method,
            self.path_format,
            self.endpoint,
        )
        .payload(self.payload)
        .parameters(self.parameters)
        .status(response.status.as_u16())
    }
}

/// Builds trace records from requests and hands them to a [`TraceQueue`].
#[derive(Debug, Clone)]
pub struct TraceCollector {
    filter: Arc<RouteFilter>,
    redactor: Arc<Redactor>,
    queue: TraceQueue,
}

impl TraceCollector {
    /// Collector with the built-in route filter and redactor.
    pub fn new(queue: TraceQueue) -> Self {
        Self {
            filter: Arc::new(RouteFilter::builtin()),
            redactor: Arc::new(Redactor::new()),
            queue,
        }
    }

    pub fn with_filter(mut self, filter: RouteFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    pub fn queue(&self) -> &TraceQueue {
        &self.queue
    }

    pub fn filter(&self) -> &RouteFilter {
        &self.filter
    }

    /// Capture a completed request in one step.
    ///
    /// Filtered routes and anonymous requests are silently skipped. A body
    /// that is not valid JSON on a POST, PUT or DELETE is reported as
    /// [`TraceError::MalformedBody`].
    pub fn capture(
        &self,
        action: &str,
        path_format: &str,
        request: &RequestContext,
        response: &ResponseContext,
    ) -> Result<()> {
        if let Some(pending) = self.prepare(action, path_format, request)? {
            self.commit(pending, response);
        }
        Ok(())
    }

    /// Whether a request would be traced, decided without its body.
    pub fn will_capture(
        &self,
        method: &str,
        path_format: &str,
        identity: Option<Identity>,
    ) -> bool {
        self.filter.should_trace(method, path_format) && identity.is_some()
    }

    /// Gate, identify, parse and redact. `Ok(None)` means nothing to trace.
    pub fn prepare(
        &self,
        action: &str,
        path_format: &str,
        request: &RequestContext,
    ) -> Result<Option<PendingTrace>> {
        let method = request.method().as_str();
        if !self.filter.should_trace(method, path_format) {
            return Ok(None);
        }
        let Some(identity) = request.user() else {
            return Ok(None);
        };

        let payload = if request.has_traced_body() {
            self.parse_body(request)?
        } else {
            None
        };

        Ok(Some(PendingTrace {
            user_id: identity.user_id,
            action: action.to_string(),
            method: method.to_string(),
            path_format: path_format.to_string(),
            endpoint: request.endpoint().to_string(),
            payload,
            parameters: Some(request.query_params()),
        }))
    }

    /// Finish and enqueue a prepared trace.
    pub fn commit(&self, pending: PendingTrace, response: &ResponseContext) {
        let record = pending.finish(response);
        tracing::debug!(
            user_id = record.user_id,
            action = %record.action,
            method = %record.method,
            path_format = %record.path_format,
            status = ?record.status,
            "Trace captured"
        );
        self.queue.enqueue(record);
    }

    fn parse_body(&self, request: &RequestContext) -> Result<Option<Value>> {
        if request.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let body: Value =
            serde_json::from_slice(&request.body).map_err(TraceError::MalformedBody)?;
        Ok(Some(self.redactor.redact_value(body)))
    }
}
