use crate::*;
use std::sync::Arc;

/// Reason recorded by [`DoneFuture::done_empty`].
pub const DONE_EMPTY_REASON: &str = "done without object";

/// A future for local operations that produce a value, or nothing.
pub struct DoneFuture<T: 'static + Send + Sync>(Arc<FutureCore<DoneFuture<T>>>);

impl<T: 'static + Send + Sync> Clone for DoneFuture<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static + Send + Sync> KitsuneFuture for DoneFuture<T> {
    type Data = Option<Arc<T>>;

    fn core(&self) -> &FutureCore<Self> {
        &self.0
    }
}

impl<T: 'static + Send + Sync> Default for DoneFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static + Send + Sync> std::fmt::Debug for DoneFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoneFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .finish()
    }
}

impl<T: 'static + Send + Sync> DoneFuture<T> {
    /// A pending future.
    pub fn new() -> Self {
        Self(Arc::new(FutureCore::new(None)))
    }

    /// Complete `Ok` carrying `value`. Returns false if already complete,
    /// in which case the value is dropped.
    pub fn done(&self, value: T) -> bool {
        self.0.try_complete(self, move |object| {
            *object = Some(Arc::new(value));
            Some(Outcome::ok("done"))
        })
    }

    /// Complete `Ok` without a value.
    pub fn done_empty(&self) -> bool {
        self.0.complete(self, Outcome::ok(DONE_EMPTY_REASON))
    }

    /// The value, if completed with one.
    pub fn object(&self) -> Option<Arc<T>> {
        self.0.with_data(|_, object| object.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn done_carries_the_value() {
        let f = DoneFuture::new();
        assert!(f.object().is_none());
        assert!(f.done(42_u32));
        assert_eq!(FutureState::Ok, f.state());
        assert_eq!(Some(42), f.object().map(|v| *v));
    }

    #[test]
    fn first_completion_keeps_its_value() {
        let f = DoneFuture::new();
        assert!(f.done("first"));
        assert!(!f.done("second"));
        assert!(!f.done_empty());
        assert_eq!(Some("first"), f.object().map(|v| *v));
    }

    #[test]
    fn done_empty_has_no_value() {
        let f = DoneFuture::<String>::new();
        assert!(f.done_empty());
        assert!(f.is_success());
        assert!(f.object().is_none());
        assert_eq!(Some(DONE_EMPTY_REASON.to_string()), f.reason());
    }

    #[test]
    fn cancelled_future_drops_a_late_value() {
        let f = DoneFuture::new();
        f.cancel();
        assert!(!f.done(1_u8));
        assert!(f.object().is_none());
    }
}
