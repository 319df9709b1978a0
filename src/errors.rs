use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

/// Failure taxonomy for the pipeline.
///
/// `Transport` means the request never produced a response; `Status` means a
/// response arrived with a non-success status. The distinction matters to the
/// inbound interceptor: only `Status` with 401 can ever trigger a refresh.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Transport(reqwest::Error),
    Status(StatusCode, String),
    Decode(jsonwebtoken::errors::Error),
    Config(String),
    MissingRefreshCredential,
    RefreshFailed(Arc<Error>),
    Timeout(Duration),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::Transport(err) => write!(f, "transport error (no response): {}", err),
            Error::Status(status, body) => {
                write!(f, "request rejected: status={} body='{}'", status, body)
            }
            Error::Decode(err) => write!(f, "credential decode error: {}", err),
            Error::Config(msg) => write!(f, "config error: {}", msg),
            Error::MissingRefreshCredential => write!(f, "no refresh credential stored"),
            Error::RefreshFailed(inner) => write!(f, "credential refresh failed: {}", inner),
            Error::Timeout(dur) => write!(f, "timed out after {:?}", dur),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Transport(err) => Some(err),
            Error::Decode(err) => Some(err),
            Error::RefreshFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

// Equality exists only so tests can `assert_eq!` on results carrying an
// `Error`; the wrapped foreign errors don't implement `PartialEq`, so they
// compare by their rendered message.
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.to_string() == b.to_string(),
            (Error::Json(a), Error::Json(b)) => a.to_string() == b.to_string(),
            (Error::Transport(a), Error::Transport(b)) => a.to_string() == b.to_string(),
            (Error::Status(a, ab), Error::Status(b, bb)) => a == b && ab == bb,
            (Error::Decode(a), Error::Decode(b)) => a.to_string() == b.to_string(),
            (Error::Config(a), Error::Config(b)) => a == b,
            (Error::MissingRefreshCredential, Error::MissingRefreshCredential) => true,
            (Error::RefreshFailed(a), Error::RefreshFailed(b)) => a == b,
            (Error::Timeout(a), Error::Timeout(b)) => a == b,
            _ => false,
        }
    }
}

impl Error {
    /// Whether this failure carries an unauthorized status from the server.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Status(status, _) if *status == StatusCode::UNAUTHORIZED)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Decode(err)
    }
}
