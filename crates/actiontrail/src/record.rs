use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat query-string parameters, exactly as received.
pub type Parameters = BTreeMap<String, String>;

/// One captured user action.
///
/// Built by [`TraceCollector`](crate::TraceCollector) once the response status
/// is known and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub user_id: i64,
    pub action: String,
    pub method: String,
    /// Route template, e.g. `/{projectId}/sessions`.
    pub path_format: String,
    /// Resolved request path.
    pub endpoint: String,
    /// Redacted request body. Never an empty object, empty array or `null`.
    pub payload: Option<Value>,
    /// Query parameters. Never an empty map.
    pub parameters: Option<Parameters>,
    pub status: Option<u16>,
    /// Capture time in epoch milliseconds.
    pub created_at: i64,
}

impl TraceRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        user_id: i64,
        action: impl Into<String>,
        method: impl Into<String>,
        path_format: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            action: action.into(),
            method: method.into(),
            path_format: path_format.into(),
            endpoint: endpoint.into(),
            payload: None,
            parameters: None,
            status: None,
            created_at: now_millis(),
        }
    }

    /// Set the payload. Empty payloads are stored as absent.
    pub fn payload(mut self, payload: Option<Value>) -> Self {
        self.payload = normalize_payload(payload);
        self
    }

    /// Set the query parameters. An empty map is stored as absent.
    pub fn parameters(mut self, parameters: Option<Parameters>) -> Self {
        self.parameters = parameters.filter(|p| !p.is_empty());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn normalize_payload(payload: Option<Value>) -> Option<Value> {
    match payload {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        other => other,
    }
}
