//! Error types for Bandshelf core operations.
//!
//! Every fallible operation in the import pipeline returns the crate-level
//! [`Error`]. Each variant carries enough context to render a user-facing
//! message, and [`ErrorKind`] provides the machine-checkable classification
//! that drives retry and re-authentication decisions.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of response-body bytes preserved in a gateway error.
pub const GATEWAY_BODY_LIMIT: usize = 512;

/// Errors that can occur in Bandshelf core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote-storage bearer token was rejected or has expired.
    ///
    /// Surfaced distinctly so the caller can trigger re-authentication
    /// instead of showing a generic failure. Never retried automatically.
    #[error("remote authorization expired: {0}")]
    AuthExpired(String),

    /// Connectivity failure or a 5xx from an upstream service.
    ///
    /// Safe to retry; the catalog-commit backoff policy keys off this.
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// Non-success response from the transcode/store backend.
    #[error("gateway returned {status}: {body}")]
    Gateway {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, truncated to [`GATEWAY_BODY_LIMIT`] bytes.
        body: String,
    },

    /// A step exceeded its deadline.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// Deadline that was exceeded, in seconds.
        seconds: u64,
    },

    /// Contract violation, e.g. a gateway response carrying neither a public
    /// URL nor a private storage key. Always fatal to the job.
    #[error("invalid response: {0}")]
    Validation(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything that does not fit the categories above.
    #[error("{0}")]
    Other(String),
}

/// Machine-checkable classification of an [`Error`].
///
/// Stored on failed import jobs so callers can branch on the failure class
/// without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Remote authorization expired; re-authentication required.
    AuthExpired,
    /// Transient connectivity or server failure; safe to retry.
    TransientNetwork,
    /// Transcode/store backend rejected the request.
    Gateway,
    /// A step exceeded its deadline.
    Timeout,
    /// Contract violation in an upstream response.
    Validation,
    /// Unclassified failure.
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthExpired => write!(f, "auth_expired"),
            Self::TransientNetwork => write!(f, "transient_network"),
            Self::Gateway => write!(f, "gateway"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl Error {
    /// Classify this error for retry/re-auth decisions.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthExpired(_) => ErrorKind::AuthExpired,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::Gateway { .. } => ErrorKind::Gateway,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Check whether this error might succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientNetwork)
    }

    /// Check whether this error means the user must re-authenticate.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::AuthExpired)
    }

    /// Create a `TransientNetwork` error with a message.
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::TransientNetwork(message.into())
    }

    /// Create a `Timeout` error for the named operation.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Create a `Validation` error with a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a `Gateway` error, truncating the body to [`GATEWAY_BODY_LIMIT`].
    pub fn gateway(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > GATEWAY_BODY_LIMIT {
            let mut end = GATEWAY_BODY_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Self::Gateway { status, body }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: "http request".to_string(),
                seconds: 0,
            }
        } else if err.is_connect() {
            Self::TransientNetwork(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}
