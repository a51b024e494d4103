//! Remote API error taxonomy
//!
//! Every failure is classified so the engine can decide between conflict
//! resolution, idempotent success, a scheduled retry or a terminal status.

use std::time::Duration;

use thiserror::Error;

/// Error returned by a [`crate::RemoteApi`] call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed entity does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind
        kind: String,
        /// Remote id (or collection path for nested lookups)
        id: String,
    },

    /// A uniqueness or data constraint rejected the write
    #[error("conflict creating {kind}: {message}")]
    Conflict {
        /// Entity kind
        kind: String,
        /// Message from the remote service
        message: String,
    },

    /// Request rejected; retrying the same payload will not help
    #[error("remote rejected request ({status}): {message}")]
    Terminal {
        /// HTTP status code (0 when not an HTTP failure)
        status: u16,
        /// Message from the remote service
        message: String,
    },

    /// The remote asked us to slow down
    #[error("rate limited by remote")]
    RateLimited {
        /// Server-provided delay hint
        retry_after: Option<Duration>,
    },

    /// Timeout, transport failure or server error
    #[error("transient remote error: {message}")]
    Transient {
        /// Description of the failure
        message: String,
    },
}

/// Coarse class of a [`RemoteError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Entity missing
    NotFound,
    /// Uniqueness/data-constraint violation
    Conflict,
    /// Permanent rejection for this payload
    Terminal,
    /// Retry later
    Transient,
}

impl ErrorClass {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Terminal => "terminal",
            Self::Transient => "transient",
        }
    }
}

impl RemoteError {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a terminal error not tied to an HTTP status
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            status: 0,
            message: message.into(),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Classify an HTTP failure
    ///
    /// 409, and 400 whose body names a unique or data constraint, are
    /// conflicts. 429 and 5xx are retryable. Other 4xx are terminal.
    pub fn from_status(
        kind: &str,
        id: Option<&str>,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = body.trim().to_string();
        match status {
            404 => Self::not_found(kind, id.unwrap_or_default()),
            409 => Self::conflict(kind, message),
            400 if mentions_constraint(body) => Self::conflict(kind, message),
            429 => Self::RateLimited { retry_after },
            400..=499 => Self::Terminal { status, message },
            _ => Self::Transient {
                message: format!("status {status}: {message}"),
            },
        }
    }

    /// Coarse class of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Terminal { .. } => ErrorClass::Terminal,
            Self::RateLimited { .. } | Self::Transient { .. } => ErrorClass::Transient,
        }
    }

    /// Whether the entity does not exist
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    /// Whether this is a uniqueness/data-constraint violation
    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }

    /// Whether retrying later may succeed
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Server-provided retry hint, when rate limited
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn mentions_constraint(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("unique constraint")
        || body.contains("data constraint")
        || body.contains("already exists")
}
