//! Error types for mailbrief.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inference engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Engine {engine} request failed: {reason}")]
    RequestFailed { engine: String, reason: String },

    #[error("Invalid response from {engine}: {reason}")]
    InvalidResponse { engine: String, reason: String },

    #[error("Engine {engine} returned an empty summary")]
    Empty { engine: String },
}

/// Knowledge-base sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink {sink} rate limited, retry after {retry_after:?}")]
    RateLimited {
        sink: String,
        retry_after: Option<Duration>,
    },

    #[error("Sink {sink} request failed: {reason}")]
    RequestFailed { sink: String, reason: String },

    #[error("Invalid response from {sink}: {reason}")]
    InvalidResponse { sink: String, reason: String },

    #[error("Sink {sink} is not reachable: {reason}")]
    Unavailable { sink: String, reason: String },
}

impl SinkError {
    /// Whether the failure is a rate-limit response (the only retryable kind).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Per-message pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message has no derivable identity")]
    MissingIdentity,

    #[error("Store failed for {message_id}: {source}")]
    Store {
        message_id: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Sink failed for {message_id}: {source}")]
    Sink {
        message_id: String,
        #[source]
        source: SinkError,
    },

    #[error("Source fetch failed: {0}")]
    Fetch(#[from] SourceError),
}

/// Result type alias for mailbrief.
pub type Result<T> = std::result::Result<T, Error>;
