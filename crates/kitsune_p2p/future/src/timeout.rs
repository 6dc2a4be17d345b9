use crate::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reason a future fails with when its [`FutureTimeout`] fires.
pub const TIMEOUT_REASON: &str = "timeout";

/// A deadline the caller owns. Futures never time out on their own;
/// arm one of these to fail a future that takes too long.
#[derive(Debug, Clone, Copy)]
pub struct FutureTimeout(Instant);

impl FutureTimeout {
    /// Create a new timeout for duration in the future.
    pub fn new(duration: Duration) -> Self {
        let now = Instant::now();
        Self(now.checked_add(duration).unwrap_or(now))
    }

    /// Convenience fn to create a new timeout for an amount of milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Get Duration until timeout expires.
    pub fn time_remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Has this timeout expired?
    pub fn is_expired(&self) -> bool {
        self.0 <= Instant::now()
    }

    /// `Ok(())` if not expired, `Err(KitsuneFutureError::TimedOut)` if expired.
    pub fn ok(&self) -> KitsuneFutureResult<()> {
        if self.is_expired() {
            Err(KitsuneFutureError::TimedOut(TIMEOUT_REASON.to_string()))
        } else {
            Ok(())
        }
    }

    /// Fail `future` with [`FailureKind::TimedOut`] if it is still pending
    /// when this timeout expires.
    ///
    /// The timer runs as a task on the current tokio runtime, and is
    /// aborted as soon as the future completes in any other way.
    pub fn arm<F: KitsuneFuture>(&self, future: &F) -> KitsuneFutureResult<()> {
        let rt = tokio::runtime::Handle::try_current().map_err(KitsuneFutureError::other)?;
        let deadline = tokio::time::Instant::from_std(self.0);
        let target = future.clone();
        let task = rt.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if target.fail_with(FailureKind::TimedOut, TIMEOUT_REASON) {
                tracing::debug!("future timed out");
            }
        });

        let abort = task.abort_handle();
        future.add_cancel_hook(Arc::new(CancelFn(move || abort.abort())));
        let abort = task.abort_handle();
        future.add_listener(move |_| abort.abort());
        Ok(())
    }
}
