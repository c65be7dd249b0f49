//! Tower middleware that records traced requests after the response is sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use actiontrail::{TraceCollector, TraceLayer, TraceQueue};
//! use tower::ServiceBuilder;
//!
//! let collector = TraceCollector::new(TraceQueue::new());
//! let service = ServiceBuilder::new()
//!     .layer(TraceLayer::for_route(collector, "update_settings", "/projects/{id}/settings"))
//!     .service(handler);
//! ```

use crate::collector::TraceCollector;
use crate::context::{
    method_has_traced_body, Identity, RequestContext, ResponseContext, TraceRoute,
};
use crate::error::TraceError;
use crate::hooks::{HookedBody, PostResponseHooks};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{header, HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use serde_json::json;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

/// Request body handed to the service behind a [`TraceLayer`].
///
/// Traced bodies arrive already buffered; every other body is streamed
/// through untouched.
pub type TraceBody = UnsyncBoxBody<Bytes, BoxError>;

fn boxed<B>(body: B) -> TraceBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    UnsyncBoxBody::new(body.map_err(Into::into))
}

/// Marks a request already handled by an outer [`TraceLayer`].
#[derive(Debug, Clone, Copy)]
struct TraceClaimed;

/// Layer producing [`TraceService`].
#[derive(Debug, Clone)]
pub struct TraceLayer {
    collector: TraceCollector,
    route: Option<TraceRoute>,
}

impl TraceLayer {
    /// Read the [`TraceRoute`] from request extensions.
    pub fn new(collector: TraceCollector) -> Self {
        Self {
            collector,
            route: None,
        }
    }

    /// Pin the action and route template, for per-route mounting.
    pub fn for_route(
        collector: TraceCollector,
        action: impl Into<String>,
        path_format: impl Into<String>,
    ) -> Self {
        Self {
            collector,
            route: Some(TraceRoute::new(action, path_format)),
        }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            collector: self.collector.clone(),
            route: self.route.clone(),
        }
    }
}

/// Service wrapping a handler with trace capture.
#[derive(Debug, Clone)]
pub struct TraceService<S> {
    inner: S,
    collector: TraceCollector,
    route: Option<TraceRoute>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<TraceBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<Bytes> + Send + 'static,
{
    type Response = Response<HookedBody<ResBody>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let collector = self.collector.clone();
        let fixed_route = self.route.clone();

        Box::pin(trace_call(inner, collector, fixed_route, req))
    }
}

async fn trace_call<S, F, ReqBody, ResBody>(
    mut inner: S,
    collector: TraceCollector,
    fixed_route: Option<TraceRoute>,
    req: Request<ReqBody>,
) -> Result<Response<HookedBody<ResBody>>, BoxError>
where
    S: Service<Request<TraceBody>, Response = Response<ResBody>, Future = F> + Send + 'static,
    F: std::future::Future<Output = Result<Response<ResBody>, S::Error>> + Send + 'static,
    S::Error: Into<BoxError>,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<Bytes>,
{
    let (mut parts, body) = req.into_parts();

    let route = if parts.extensions.get::<TraceClaimed>().is_some() {
        None
    } else {
        fixed_route.or_else(|| parts.extensions.get::<TraceRoute>().cloned())
    };
    if route.is_some() {
        parts.extensions.insert(TraceClaimed);
    }

    // Decide before touching the body: untraced requests stream through.
    let identity = parts.extensions.get::<Identity>().copied();
    let route = route.filter(|route| {
        collector.will_capture(parts.method.as_str(), &route.path_format, identity)
    });

    let mut pending = None;
    let body = match route {
        None => boxed(body),
        Some(route) => {
            let (body, bytes) = if method_has_traced_body(&parts.method) {
                let bytes = body
                    .collect()
                    .await
                    .map_err(Into::<BoxError>::into)?
                    .to_bytes();
                (boxed(Full::new(bytes.clone())), bytes)
            } else {
                (boxed(body), Bytes::new())
            };

            let ctx = RequestContext::from_parts(&parts, bytes);
            match collector.prepare(&route.action, &route.path_format, &ctx) {
                Ok(prepared) => pending = prepared,
                Err(TraceError::MalformedBody(e)) => {
                    tracing::debug!(
                        path_format = %route.path_format,
                        error = %e,
                        "Rejecting malformed request body"
                    );
                    return Ok(malformed_body_response(&e));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Trace capture skipped");
                }
            }
            body
        }
    };

    let response = inner
        .call(Request::from_parts(parts, body))
        .await
        .map_err(Into::<BoxError>::into)?;

    let (parts, body) = response.into_parts();
    let mut hooks = PostResponseHooks::new();
    if let Some(pending) = pending {
        let response_ctx = ResponseContext::new(parts.status);
        hooks.push(move || collector.commit(pending, &response_ctx));
    }
    Ok(Response::from_parts(parts, HookedBody::new(body, hooks)))
}

fn malformed_body_response<B: From<Bytes>>(err: &serde_json::Error) -> Response<HookedBody<B>> {
    let body = json!({
        "error": "malformed_body",
        "message": err.to_string(),
    });
    let bytes = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = Response::new(HookedBody::new(
        B::from(Bytes::from(bytes)),
        PostResponseHooks::new(),
    ));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
