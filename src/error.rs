//! Stable error model returned by the request pipeline.
//! Every failure leaving the pipeline is a `NormalizedError`: a coarse `ErrorKind`
//! callers can branch on, a human message, optional per-field validation messages, and
//! the raw `Failure` it was derived from so nothing is lost on the way out.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential missing, expired or rejected and not recoverable by refresh. Drives logout.
    Unauthorized,
    Forbidden,
    NotFound,
    /// 422 from the server; `NormalizedError::field_errors` carries the per-field messages.
    Validation,
    ServerError,
    /// Network failures and any status without a dedicated kind.
    Unknown,
}

impl ErrorKind {
    pub fn code_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Kinds after which the session can no longer be trusted.
    pub fn is_terminal(&self) -> bool { matches!(self, ErrorKind::Unauthorized) }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.code_str()) }
}

/// Failures raised below HTTP status handling: the exchange itself did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report which timeout fired
            TransportError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// The raw failure a `NormalizedError` was shaped from.
#[derive(Debug, Clone)]
pub enum Failure {
    /// The server answered with a non-success status.
    Status { status: u16, body: Option<Value> },
    Transport(TransportError),
}

impl Failure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::Status { status, .. } => Some(*status),
            Failure::Transport(_) => None,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Failure::Status { body, .. } => body.as_ref(),
            Failure::Transport(_) => None,
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Status { status, body: Some(body) } => write!(f, "HTTP {}: {}", status, body),
            Failure::Status { status, body: None } => write!(f, "HTTP {}", status),
            Failure::Transport(e) => write!(f, "{}", e),
        }
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self { Failure::Transport(err) }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct NormalizedError {
    pub kind: ErrorKind,
    pub message: String,
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    pub original: Failure,
}

impl NormalizedError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S, original: Failure) -> Self {
        Self { kind, message: message.into(), field_errors: None, original }
    }

    pub fn with_field_errors(mut self, fields: BTreeMap<String, Vec<String>>) -> Self {
        self.field_errors = Some(fields);
        self
    }

    /// Client-side failure that never reached a status code (bad response shape, malformed credential).
    pub fn local<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        Self::new(ErrorKind::Unknown, message.clone(), Failure::Transport(TransportError::Decode(message)))
    }

    pub fn status(&self) -> Option<u16> { self.original.status() }

    pub fn is_unauthorized(&self) -> bool { self.kind == ErrorKind::Unauthorized }

    /// One-line message for display: field errors as `field: a, b; other: c` when present,
    /// otherwise the normalized message.
    pub fn display_message(&self) -> String {
        if let Some(fields) = &self.field_errors {
            let joined = fields
                .iter()
                .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
        self.message.clone()
    }
}

pub type ApiResult<T> = Result<T, NormalizedError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
