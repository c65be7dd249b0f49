//! Environment-driven configuration.
//!
//! ```ignore
//! use actiontrail::config::{load_dotenv, TraceConfig};
//!
//! load_dotenv();
//! let config = TraceConfig::from_env()?;
//! let scheduler = flusher.spawn(config.flush_interval());
//! ```

use crate::error::Result;
use crate::redact::Redactor;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TRACES_PERIOD: u64 = 60;
pub const DEFAULT_TRACES_TABLE: &str = "traces";

/// Trace pipeline settings.
///
/// | variable | default |
/// |---|---|
/// | `TRACES_PERIOD` | 60 (seconds between flushes) |
/// | `TRACES_TABLE` | `traces` |
/// | `TRACES_HIDDEN_KEYS` | empty (comma separated extra body keys to redact) |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_traces_period")]
    pub traces_period: u64,
    #[serde(default = "default_traces_table")]
    pub traces_table: String,
    #[serde(default)]
    pub traces_hidden_keys: Vec<String>,
}

fn default_traces_period() -> u64 {
    DEFAULT_TRACES_PERIOD
}

fn default_traces_table() -> String {
    DEFAULT_TRACES_TABLE.to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            traces_period: DEFAULT_TRACES_PERIOD,
            traces_table: default_traces_table(),
            traces_hidden_keys: Vec::new(),
        }
    }
}

impl TraceConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(envy::from_env::<Self>()?)
    }

    /// Time between flushes, at least one second.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.traces_period.max(1))
    }

    /// Redactor with the built-in keys plus `traces_hidden_keys`.
    pub fn redactor(&self) -> Redactor {
        Redactor::new().with_keys(
            self.traces_hidden_keys
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty()),
        )
    }
}

/// Load a `.env` file from the working directory, if there is one.
///
/// Existing environment variables take precedence.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
