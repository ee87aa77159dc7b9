//! Error types for reconciliation.
//!
//! Remote failures are categorized so the engine can decide between
//! retrying, tolerating (not-found during teardown) and failing a key.
//! Configuration errors reject a whole declaration set before any remote
//! call is made.

use std::fmt;
use thiserror::Error;

/// Categories of remote failures for retry and tolerance decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The remote object does not exist
    NotFound,
    /// Connection, DNS, 5xx or rate limiting (transient)
    Transport,
    /// The call did not complete within the configured timeout
    Timeout,
    /// The remote rejected the request on business grounds
    Logic,
}

impl ErrorCategory {
    /// Whether this category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }

    /// Whether a teardown step hitting this category has nothing left to do.
    pub fn is_ignorable_on_removal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Timeout)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Remote object not found",
            Self::Transport => "Remote service unreachable",
            Self::Timeout => "Remote call timed out",
            Self::Logic => "Remote service rejected the request",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "The object was removed remotely; the next pass recreates it",
            Self::Transport => "Check your network connection and try again",
            Self::Timeout => "Raise the timeout or try again later",
            Self::Logic => "Check the declaration against the remote service's rules",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Failure reported by a remote API client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status code if a response was received
        status: Option<u16>,
    },

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    #[error("remote rejected request: {message}")]
    Logic {
        message: String,
        status: Option<u16>,
    },
}

impl RemoteError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn logic(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Logic {
            message: message.into(),
            status,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Logic { .. } => ErrorCategory::Logic,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// A create rejected because the name is already taken.
    pub fn is_name_collision(&self) -> bool {
        match self {
            Self::Logic { message, status } => {
                *status == Some(409) || message.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }
}

/// Problems with a declaration set, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("materialized view '{view}' references undeclared query '{query}'")]
    UnknownSourceQuery { view: String, query: String },

    #[error("materialized view '{view}' has malformed schedule '{schedule}': {reason}")]
    InvalidSchedule {
        view: String,
        schedule: String,
        reason: String,
    },

    #[error("'{key}' has an empty {field}")]
    EmptyField { key: String, field: &'static str },

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("key '{key}' is declared more than once")]
    DuplicateKey { key: String },
}

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credentials unavailable: no API key configured")]
    Credentials,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("materialized view '{view}' needs query '{query}', which has not converged in this pass")]
    UnresolvedSource { view: String, query: String },

    #[error("failed to run worker pool: {0}")]
    Pool(String),
}

impl Error {
    /// The remote category, if this is a remote failure.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Remote(e) => Some(e.category()),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for remote client calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
