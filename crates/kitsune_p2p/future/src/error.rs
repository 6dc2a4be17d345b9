//! Kitsune future error types

use crate::FailureKind;

/// Error describing why a future did not complete successfully,
/// or why a payload accessor could not produce a value.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KitsuneFutureError {
    /// No usable reply was received.
    #[error("communication failure: {0}")]
    Communication(String),

    /// The reply was received but evaluated as a failure.
    #[error("application failure: {0}")]
    Application(String),

    /// The future was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The payload could not be decoded.
    #[error("decode failure: {0}")]
    Decode(String),

    /// A caller-owned timer gave up waiting.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// Unspecified error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl KitsuneFutureError {
    /// promote a custom error type to a KitsuneFutureError
    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(e.into())
    }

    /// Build the error matching a terminal failure kind and reason.
    pub fn from_kind(kind: FailureKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match kind {
            FailureKind::Communication => Self::Communication(reason),
            FailureKind::Application => Self::Application(reason),
            FailureKind::Cancelled => Self::Cancelled(reason),
            FailureKind::Decode => Self::Decode(reason),
            FailureKind::TimedOut => Self::TimedOut(reason),
        }
    }

    /// The failure kind this error represents, if any.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Communication(_) => Some(FailureKind::Communication),
            Self::Application(_) => Some(FailureKind::Application),
            Self::Cancelled(_) => Some(FailureKind::Cancelled),
            Self::Decode(_) => Some(FailureKind::Decode),
            Self::TimedOut(_) => Some(FailureKind::TimedOut),
            Self::Other(_) => None,
        }
    }
}

impl From<String> for KitsuneFutureError {
    fn from(s: String) -> Self {
        #[derive(Debug, thiserror::Error)]
        struct OtherError(String);
        impl std::fmt::Display for OtherError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        KitsuneFutureError::other(OtherError(s))
    }
}

impl From<&str> for KitsuneFutureError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<rmp_serde::decode::Error> for KitsuneFutureError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Result type for kitsune futures.
pub type KitsuneFutureResult<T> = Result<T, KitsuneFutureError>;
