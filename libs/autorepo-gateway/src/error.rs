use std::fmt;

use thiserror::Error;

/// Classification of a call that did not resolve to a value.
///
/// Match on the kind, never on [`CallError::message`]; messages come from the
/// backend and are meant for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 401 after a declined or failed re-login, or 401 on the replayed call
    Unauthorized,
    /// 401 while another re-authentication flow is already running
    UnauthorizedInProgress,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Any other non-2xx status; message taken from the body `detail`
    RequestFailed,
    /// Transport attempt timed out and the retry budget is exhausted
    Timeout,
    /// Backend unreachable (connection refused, DNS, reset)
    NetworkError,
    /// Environment and transport do not fit together (e.g. relative address
    /// on the direct transport)
    ConfigError,
    /// The relay capability is missing on this host
    SystemUnavailable,
    /// Transport failure that fits no other kind
    UnknownError,
}

impl ErrorKind {
    /// Kind for a non-2xx, non-401 status code.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::RequestFailed,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::UnauthorizedInProgress => "unauthorized_in_progress",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::RequestFailed => "request_failed",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::ConfigError => "config_error",
            Self::SystemUnavailable => "system_unavailable",
            Self::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a call that did not succeed.
///
/// Returned to the caller as a value; the gateway never retries a
/// `CallError` on its own.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct CallError {
    kind: ErrorKind,
    message: String,
    status_code: Option<u16>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CallError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            cause: None,
        }
    }

    /// Error for an HTTP status, carrying the status code.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_status(status), message).with_status(status)
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message).with_status(401)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthorized | ErrorKind::UnauthorizedInProgress
        )
    }
}
