use thiserror::Error;

/// Convenience alias for `Result<T, KestrelError>`.
pub type KestrelResult<T> = Result<T, KestrelError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — bad input or misconfiguration; fixing requires operator action
/// - `Retryable`   — contention or ordering conflict; caller SHOULD retry
/// - `Transient`   — unreachable peer, timeout, backpressure; caller MAY retry after back-off
/// - `InternalBug` — should never happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Registration protocol errors.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// This authority was asked to authorize a candidate while itself
    /// unidentified, outside the bootstrap self-registration case.
    #[error("this node has not been configured; no row found in the identity table")]
    NotConfigured,

    /// The client join loop exhausted its configured attempt budget.
    #[error("failed to register after trying {attempts} times")]
    RegistrationFailed { attempts: i64 },

    /// The registration authority could not be reached (unknown host,
    /// connection refused). Counted as a failed attempt, never fatal to
    /// the retry loop.
    #[error("registration authority unreachable: {0}")]
    TransportUnreachable(String),

    /// A registration round trip failed for a non-transport reason.
    #[error("registration attempt failed: {0}")]
    AttemptFailed(String),

    /// An operation referenced a node id with no backing row.
    #[error("unknown node: {0}")]
    UnknownNode(String),
}

/// Backing-store errors (parameterized SQL layer).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KestrelError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KestrelError::Registration(RegistrationError::NotConfigured) => ErrorKind::UserError,
            KestrelError::Registration(RegistrationError::UnknownNode(_)) => ErrorKind::UserError,
            KestrelError::Registration(RegistrationError::RegistrationFailed { .. }) => {
                ErrorKind::Retryable
            }
            KestrelError::Registration(RegistrationError::TransportUnreachable(_)) => {
                ErrorKind::Transient
            }
            KestrelError::Registration(RegistrationError::AttemptFailed(_)) => ErrorKind::Retryable,
            KestrelError::Store(StoreError::Transaction(_)) => ErrorKind::Retryable,
            KestrelError::Store(_) => ErrorKind::Transient,
            KestrelError::Io(_) => ErrorKind::Transient,
            KestrelError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the caller should retry after a back-off.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Returns true if the caller should retry immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// Returns true if operator action is required before retrying.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Add context to the error message, preserving classification where the
    /// variant structure allows it.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            KestrelError::Internal(msg) => KestrelError::Internal(format!("{ctx}: {msg}")),
            KestrelError::Store(StoreError::Sql(msg)) => {
                KestrelError::Store(StoreError::Sql(format!("{ctx}: {msg}")))
            }
            KestrelError::Store(StoreError::Transaction(msg)) => {
                KestrelError::Store(StoreError::Transaction(format!("{ctx}: {msg}")))
            }
            other => other,
        }
    }
}
