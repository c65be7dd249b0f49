use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    /// A body-bearing request carried a body that is not valid JSON.
    #[error("Malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("Invalid route pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<envy::Error> for TraceError {
    fn from(err: envy::Error) -> Self {
        TraceError::Config(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for TraceError {
    fn from(err: sqlx::Error) -> Self {
        TraceError::Sink(err.to_string())
    }
}

pub type Result<T, E = TraceError> = std::result::Result<T, E>;
