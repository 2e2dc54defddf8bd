//! Classification of sync failures.

use crate::error::SyncError;
use std::fmt;
use std::io;
use std::sync::Arc;

/// A sync failure mapped onto the small taxonomy consumers act on.
///
/// Every variant keeps the original error so it can still be logged or
/// reported. The cause is shared so resolved errors can be cloned onto
/// broadcast streams.
#[derive(Debug, Clone)]
pub enum ResolvedError {
    /// Transient network trouble (socket, timeout, DNS, TLS, connection reset).
    NetworkRelated(Arc<SyncError>),
    /// The server rejected our credentials (HTTP 401).
    Unauthenticated(Arc<SyncError>),
    /// The server failed (HTTP 5xx).
    ServerError(Arc<SyncError>),
    /// Anything we did not anticipate.
    Unexpected(Arc<SyncError>),
}

impl ResolvedError {
    /// Returns the original error.
    pub fn actual_cause(&self) -> &SyncError {
        match self {
            ResolvedError::NetworkRelated(cause)
            | ResolvedError::Unauthenticated(cause)
            | ResolvedError::ServerError(cause)
            | ResolvedError::Unexpected(cause) => cause,
        }
    }

    /// Returns the name of the category, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedError::NetworkRelated(_) => "network_related",
            ResolvedError::Unauthenticated(_) => "unauthenticated",
            ResolvedError::ServerError(_) => "server_error",
            ResolvedError::Unexpected(_) => "unexpected",
        }
    }

    /// Returns true for failures that should reach a crash reporter.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            ResolvedError::ServerError(_) | ResolvedError::Unexpected(_)
        )
    }
}

impl fmt::Display for ResolvedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.actual_cause())
    }
}

/// Maps arbitrary sync failures onto [`ResolvedError`].
///
/// The resolver does not decide retry policy; it only supplies the signal
/// that status indicators and backoff schedulers use.
pub struct ErrorResolver;

impl ErrorResolver {
    /// Classifies a failure.
    pub fn resolve(error: SyncError) -> ResolvedError {
        let category = Self::categorize(&error);
        let cause = Arc::new(error);

        match category {
            Category::Network => ResolvedError::NetworkRelated(cause),
            Category::Unauthenticated => ResolvedError::Unauthenticated(cause),
            Category::Server => ResolvedError::ServerError(cause),
            Category::Unexpected => ResolvedError::Unexpected(cause),
        }
    }

    fn categorize(error: &SyncError) -> Category {
        match Self::actual_cause(error) {
            SyncError::Io(io_error) if is_network_io(io_error) => Category::Network,
            SyncError::Timeout | SyncError::Tls(_) => Category::Network,
            SyncError::Transport {
                retryable: true, ..
            } => Category::Network,
            SyncError::Http { status: 401, .. } => Category::Unauthenticated,
            SyncError::Http { status, .. } if (500..600).contains(status) => Category::Server,
            _ => Category::Unexpected,
        }
    }

    /// Unwraps composite errors down to the first real failure.
    fn actual_cause(error: &SyncError) -> &SyncError {
        match error {
            SyncError::Composite(errors) => match errors.first() {
                Some(first) => Self::actual_cause(first),
                None => error,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Network,
    Unauthenticated,
    Server,
    Unexpected,
}

fn is_network_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof
    )
}
