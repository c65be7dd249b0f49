//! Scrubbing of sensitive keys in request bodies.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Replacement value for scrubbed keys.
pub const HIDDEN: &str = "HIDDEN";

/// Top-level body keys that are always scrubbed. Matching is case-sensitive.
pub const SENSITIVE_KEYS: [&str; 10] = [
    "token",
    "password",
    "authorizationToken",
    "authHeader",
    "xQueryKey",
    "awsSecretAccessKey",
    "serviceAccountCredentials",
    "accessKey",
    "applicationKey",
    "apiKey",
];

/// Replaces the values of sensitive top-level keys with [`HIDDEN`].
///
/// Nested objects are not inspected.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: HashSet<String>,
}

impl Redactor {
    /// Redactor with the built-in [`SENSITIVE_KEYS`].
    pub fn new() -> Self {
        Self {
            keys: SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Add an extra sensitive key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// Add several extra sensitive keys.
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Scrub `body` and return the map to store.
    pub fn redact(&self, mut body: Map<String, Value>) -> Map<String, Value> {
        for (key, value) in body.iter_mut() {
            if self.keys.contains(key) {
                *value = Value::String(HIDDEN.to_string());
            }
        }
        body
    }

    /// Scrub a JSON value. Only objects are touched.
    pub fn redact_value(&self, body: Value) -> Value {
        match body {
            Value::Object(map) => Value::Object(self.redact(map)),
            other => other,
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scrub `body` with the built-in key set.
pub fn redact(body: Map<String, Value>) -> Map<String, Value> {
    Redactor::new().redact(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_redacts_sensitive_keys() {
        let body = as_map(json!({"apiKey": "secret", "name": "x", "password": 42}));
        let redacted = redact(body);

        assert_eq!(redacted["apiKey"], json!("HIDDEN"));
        assert_eq!(redacted["password"], json!("HIDDEN"));
        assert_eq!(redacted["name"], json!("x"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let redacted = redact(as_map(json!({"APIKEY": "a", "Token": "b"})));
        assert_eq!(redacted["APIKEY"], json!("a"));
        assert_eq!(redacted["Token"], json!("b"));
    }

    #[test]
    fn test_does_not_recurse() {
        let redacted = redact(as_map(json!({"config": {"token": "abc"}})));
        assert_eq!(redacted["config"], json!({"token": "abc"}));
    }

    #[test]
    fn test_absent_keys_not_added() {
        let redacted = redact(as_map(json!({"name": "x"})));
        assert_eq!(redacted.len(), 1);
        assert!(!redacted.contains_key("token"));
    }

    #[test]
    fn test_extra_keys() {
        let redactor = Redactor::new().with_key("licenseKey");
        let redacted = redactor.redact(as_map(json!({"licenseKey": "k", "apiKey": "a"})));
        assert_eq!(redacted["licenseKey"], json!("HIDDEN"));
        assert_eq!(redacted["apiKey"], json!("HIDDEN"));
    }

    #[test]
    fn test_redact_value_leaves_non_objects() {
        let redactor = Redactor::new();
        assert_eq!(redactor.redact_value(json!(["token"])), json!(["token"]));
        assert_eq!(redactor.redact_value(json!("token")), json!("token"));
    }

    fn key_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(SENSITIVE_KEYS.to_vec()).prop_map(String::from),
            "[a-zA-Z]{1,12}",
        ]
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z ]{0,10}".prop_map(Value::from),
            Just(json!({"nested": "value"})),
        ]
    }

    proptest! {
        /// Exactly the keys in both the body and the sensitive set become HIDDEN;
        /// every other value is unchanged.
        #[test]
        fn prop_redacts_exactly_sensitive_keys(
            entries in prop::collection::btree_map(key_strategy(), value_strategy(), 0..12)
        ) {
            let body: Map<String, Value> = entries.clone().into_iter().collect();
            let redacted = redact(body);

            prop_assert_eq!(redacted.len(), entries.len());
            for (key, original) in &entries {
                let value = &redacted[key.as_str()];
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    prop_assert_eq!(value, &json!(HIDDEN));
                } else {
                    prop_assert_eq!(value, original);
                }
            }
        }
    }
}
