use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    Timeout,
    ConnectionFailure,
    HttpStatus(u16),
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => f.write_str("timeout"),
            TransportErrorKind::ConnectionFailure => f.write_str("connection failure"),
            TransportErrorKind::HttpStatus(status) => write!(f, "http status {}", status),
        }
    }
}

/// Failure of the last attempt made against the backend
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub(crate) struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: format!("no response within {:?}", after),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::ConnectionFailure,
            message: message.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::HttpStatus(status),
            message: body.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self {
                kind: TransportErrorKind::Timeout,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::connection(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum CompanionError {
    #[error("generation backend is unavailable")]
    Unavailable,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("stream interrupted: {0}")]
    Interrupted(TransportError),
}

/// A stream line that is not a JSON record. Skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed stream line: {0}")]
pub(crate) struct DecodeError(pub String);

#[derive(Debug, Error)]
pub(crate) enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("home directory not found")]
    NoHome,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config value `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
