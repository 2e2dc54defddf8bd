//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O failure from the network stack or local storage.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-success HTTP status.
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// TLS handshake failed.
    #[error("tls handshake failed: {0}")]
    Tls(String),

    /// Local repository failed to read or write records.
    #[error("repository error: {0}")]
    Repository(String),

    /// Persisted preferences could not be read or written.
    #[error("preferences error: {0}")]
    Preferences(String),

    /// A request URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Request or response body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Several failures wrapped together; the first one is the cause.
    #[error("{}", composite_summary(.0))]
    Composite(Vec<SyncError>),

    /// Anything else.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}

fn composite_summary(errors: &[SyncError]) -> String {
    match errors.first() {
        Some(first) => format!("{} errors, first: {}", errors.len(), first),
        None => "empty composite error".to_string(),
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
