//! Request and response views consumed by the collector.

use crate::record::Parameters;
use bytes::Bytes;
use http::{request::Parts, Method, StatusCode, Uri};

/// Authenticated caller, inserted into request extensions by the host's
/// auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
}

impl Identity {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

/// Matched route, inserted into request extensions by the host's router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRoute {
    /// Action tag stored with the record, e.g. `update_project_settings`.
    pub action: String,
    /// Route template, e.g. `/projects/{id}/settings`.
    pub path_format: String,
}

impl TraceRoute {
    pub fn new(action: impl Into<String>, path_format: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            path_format: path_format.into(),
        }
    }
}

/// What the collector needs to know about a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub(crate) method: Method,
    pub(crate) endpoint: String,
    pub(crate) query: Option<String>,
    pub(crate) body: Bytes,
    pub(crate) identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(method: Method, uri: &Uri) -> Self {
        Self {
            method,
            endpoint: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            body: Bytes::new(),
            identity: None,
        }
    }

    /// Build from request parts. The identity is read from the extensions.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            identity: parts.extensions.get::<Identity>().copied(),
            ..Self::new(parts.method.clone(), &parts.uri)
        }
        .body(body)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn user(&self) -> Option<Identity> {
        self.identity
    }

    /// Decoded query parameters. For a repeated key the last value wins.
    pub fn query_params(&self) -> Parameters {
        let Some(query) = self.query.as_deref() else {
            return Parameters::new();
        };
        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Unparseable query string");
                Parameters::new()
            }
        }
    }

    /// Whether the method carries a body worth recording.
    pub fn has_traced_body(&self) -> bool {
        method_has_traced_body(&self.method)
    }
}

pub(crate) fn method_has_traced_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::DELETE
}

/// What the collector needs to know about a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseContext {
    pub status: StatusCode,
}

impl ResponseContext {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}
