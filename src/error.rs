//! Top-level error types for monitor-study.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config from {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Persisted toggle state errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The state file exists but could not be read or decoded. Always recovered
    /// by falling back to the configured default.
    #[error("failed to read state file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        source: Arc<std::io::Error>,
    },
}

/// Completion endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("completion response is not valid: {0}")]
    Parse(String),

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Outbound messaging errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("failed to send message to {conversation_id}: {message}")]
    SendFailed {
        conversation_id: String,
        message: String,
    },

    #[error("messaging adapter {0} is shut down")]
    Closed(String),
}
