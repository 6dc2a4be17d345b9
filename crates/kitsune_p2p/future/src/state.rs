//! Future states and terminal outcomes.

/// The lifecycle state of a future.
///
/// A future is created [`FutureState::Pending`] and moves to one of the
/// other three states exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FutureState {
    /// No outcome yet.
    Pending,

    /// The operation completed.
    Ok,

    /// The operation failed. See [`FailureKind`] for why.
    Failed,

    /// The operation was cancelled before it completed.
    Cancelled,
}

impl FutureState {
    /// Has this state left `Pending`?
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FutureState::Pending)
    }
}

/// Why a future did not end up `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FailureKind {
    /// There was no usable reply.
    Communication,

    /// The reply arrived, but the evaluator judged it a failure.
    Application,

    /// The future was cancelled.
    Cancelled,

    /// The reply payload could not be materialized.
    Decode,

    /// A caller-owned timer gave up on the future.
    TimedOut,
}

/// A terminal transition: the state to move to, the human readable reason,
/// and the failure kind when the state is not `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Terminal state.
    pub state: FutureState,

    /// Human readable explanation.
    pub reason: String,

    /// Present for `Failed` and `Cancelled` outcomes.
    pub kind: Option<FailureKind>,
}

impl Outcome {
    /// A successful outcome.
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            state: FutureState::Ok,
            reason: reason.into(),
            kind: None,
        }
    }

    /// A failed outcome of the given kind.
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            state: FutureState::Failed,
            reason: reason.into(),
            kind: Some(kind),
        }
    }

    /// The outcome every cancelled future ends with.
    pub fn cancelled() -> Self {
        Self {
            state: FutureState::Cancelled,
            reason: CANCELLED_REASON.to_string(),
            kind: Some(FailureKind::Cancelled),
        }
    }

    /// Build an outcome from a raw state.
    /// Returns `None` for `Pending`, which is not a valid terminal state.
    pub fn from_state(state: FutureState, reason: impl Into<String>) -> Option<Self> {
        match state {
            FutureState::Pending => None,
            FutureState::Ok => Some(Self::ok(reason)),
            FutureState::Failed => Some(Self::failed(FailureKind::Communication, reason)),
            FutureState::Cancelled => Some(Self {
                state,
                reason: reason.into(),
                kind: Some(FailureKind::Cancelled),
            }),
        }
    }
}

/// Reason recorded by [`crate::KitsuneFuture::cancel`].
pub const CANCELLED_REASON: &str = "cancelled";
