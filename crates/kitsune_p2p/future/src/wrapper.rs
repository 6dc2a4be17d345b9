use crate::*;
use std::sync::{Arc, Weak};

/// Lock-protected state of a [`WrapperFuture`].
pub struct WrapperData<X> {
    extra: Option<X>,
    inner: Vec<Arc<dyn CancelHook>>,
}

/// A future mirroring the outcome of an inner future, while carrying extra
/// domain data about the composed operation (e.g. the peers contacted).
///
/// The wrapper does not need to wrap anything right away. Compound operations
/// create the wrapper first, hand it to the caller, and wrap the future of
/// whichever step ends up deciding the outcome.
pub struct WrapperFuture<X: 'static + Send>(Arc<FutureCore<WrapperFuture<X>>>);

impl<X: 'static + Send> Clone for WrapperFuture<X> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<X: 'static + Send> KitsuneFuture for WrapperFuture<X> {
    type Data = WrapperData<X>;

    fn core(&self) -> &FutureCore<Self> {
        &self.0
    }

    /// Completing as `Cancelled` goes through [`WrapperFuture::cancel`].
    fn complete(&self, state: FutureState, reason: impl Into<String>) -> bool {
        match Outcome::from_state(state, reason) {
            Some(outcome) if outcome.state == FutureState::Cancelled => {
                self.cancel_with(outcome)
            }
            Some(outcome) => self.0.complete(self, outcome),
            None => false,
        }
    }

    /// Cancels the inner futures first, then the wrapper.
    fn cancel(&self) -> bool {
        self.cancel_with(Outcome::cancelled())
    }
}

impl<X: 'static + Send> std::fmt::Debug for WrapperFuture<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .finish()
    }
}

impl<X: 'static + Send> Default for WrapperFuture<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: 'static + Send> WrapperFuture<X> {
    /// A pending wrapper with nothing wrapped yet.
    pub fn new() -> Self {
        Self(Arc::new(FutureCore::new(WrapperData {
            extra: None,
            inner: Vec::new(),
        })))
    }

    fn cancel_with(&self, outcome: Outcome) -> bool {
        let inner = self.0.with_data(|state, d| {
            if state.is_terminal() {
                Vec::new()
            } else {
                std::mem::take(&mut d.inner)
            }
        });
        let propagated = !inner.is_empty();
        for inner in inner {
            inner.on_cancel();
        }
        self.0.complete(self, outcome) || (propagated && self.is_cancelled())
    }

    /// Mirror the outcome of `inner`: once it completes, this wrapper
    /// completes with the same state, reason and failure kind.
    /// Cancelling this wrapper cancels `inner`, or does so right away if
    /// the wrapper is already cancelled.
    ///
    /// Wrapping again adds another inner future. The first one to complete
    /// decides the outcome, and cancellation reaches all of them.
    /// The inner future only holds a weak link back to the wrapper.
    pub fn wrap<F: KitsuneFuture>(&self, inner: &F) -> Self {
        let state = self.0.with_data(|state, d| {
            if !state.is_terminal() {
                d.inner.push(Arc::new(inner.clone()));
            }
            state
        });
        if state == FutureState::Cancelled {
            inner.cancel();
            return self.clone();
        }
        let weak: Weak<FutureCore<Self>> = Arc::downgrade(&self.0);
        inner.add_listener(move |inner| {
            let (Some(core), Some(outcome)) = (weak.upgrade(), inner.outcome()) else {
                return;
            };
            let this = WrapperFuture(core);
            this.0.complete(&this, outcome);
        });
        self.clone()
    }

    /// Attach extra data. May be called at any time, before or after
    /// completion.
    pub fn set_extra(&self, extra: X) {
        self.0.with_data(|_, d| d.extra = Some(extra));
    }

    /// Inspect the extra data.
    pub fn with_extra<R>(&self, f: impl FnOnce(Option<&X>) -> R) -> R {
        self.0.with_data(|_, d| f(d.extra.as_ref()))
    }

    /// A copy of the extra data.
    pub fn extra(&self) -> Option<X>
    where
        X: Clone,
    {
        self.with_extra(|x| x.cloned())
    }
}

/// The future of a bootstrap: the outcome of the final step, plus the
/// addresses that were contacted.
pub type BootstrapFuture<A> = WrapperFuture<Vec<A>>;

impl<A: 'static + Send + Clone> WrapperFuture<Vec<A>> {
    /// The addresses this bootstrap contacted.
    pub fn bootstrap_to(&self) -> Vec<A> {
        self.extra().unwrap_or_default()
    }

    /// Record the addresses this bootstrap contacted.
    pub fn set_bootstrap_to(&self, addrs: Vec<A>) {
        self.set_extra(addrs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::DropCounter;
    use pretty_assertions::assert_eq;

    #[test]
    fn mirrors_inner_failure() {
        let inner = BaseFuture::new();
        let w = WrapperFuture::<()>::new().wrap(&inner);
        assert_eq!(FutureState::Pending, w.state());

        inner.fail("peer unreachable");
        assert_eq!(FutureState::Failed, w.state());
        assert_eq!(Some("peer unreachable".to_string()), w.reason());
        assert_eq!(inner.outcome(), w.outcome());
    }

    #[test]
    fn wrapping_a_completed_future_completes_immediately() {
        let inner = BaseFuture::new();
        inner.complete(FutureState::Ok, "pong");
        let w = WrapperFuture::<()>::new().wrap(&inner);
        assert_eq!(FutureState::Ok, w.state());
        assert_eq!(Some("pong".to_string()), w.reason());
    }

    #[test]
    fn cancel_propagates_to_inner() {
        let inner = BaseFuture::new();
        let w = WrapperFuture::<()>::new().wrap(&inner);
        assert!(w.cancel());
        assert_eq!(FutureState::Cancelled, inner.state());
        assert_eq!(FutureState::Cancelled, w.state());
        assert!(!w.cancel());
    }

    #[test]
    fn cancel_after_completion_leaves_inner_alone() {
        let inner = BaseFuture::new();
        let w = WrapperFuture::<()>::new().wrap(&inner);
        w.complete(FutureState::Ok, "decided early");
        assert!(!w.cancel());
        assert_eq!(FutureState::Pending, inner.state());
    }

    #[test]
    fn complete_as_cancelled_propagates_to_inner() {
        let inner = BaseFuture::new();
        let w = WrapperFuture::<()>::new().wrap(&inner);
        assert!(w.complete(FutureState::Cancelled, "caller gave up"));
        assert_eq!(FutureState::Cancelled, inner.state());
        assert_eq!(FutureState::Cancelled, w.state());
    }

    #[test]
    fn cancel_reaches_every_wrapped_future() {
        let first = BaseFuture::new();
        let second = BaseFuture::new();
        let w = WrapperFuture::<()>::new().wrap(&first).wrap(&second);
        assert!(w.cancel());
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());

        // wrapping into a cancelled wrapper cancels right away
        let third = BaseFuture::new();
        w.wrap(&third);
        assert!(third.is_cancelled());
    }

    #[test]
    fn pending_inner_does_not_keep_the_wrapper_alive() {
        let drops = DropCounter::default();
        let inner = BaseFuture::new();
        let w = WrapperFuture::new().wrap(&inner);
        w.set_extra(drops.token());
        drop(w);
        assert_eq!(1, drops.count());

        // the inner future completing later is harmless
        assert!(inner.complete(FutureState::Ok, "late"));
    }

    #[test]
    fn wrapper_and_inner_are_freed_together() {
        let drops = DropCounter::default();
        let inner = WrapperFuture::new();
        inner.set_extra(drops.token());
        let w = WrapperFuture::new().wrap(&inner);
        w.set_extra(drops.token());
        drop(inner);
        assert_eq!(0, drops.count());
        drop(w);
        assert_eq!(2, drops.count());
    }

    #[test]
    fn extra_data_is_readable_any_time() {
        let inner = BaseFuture::new();
        let w: BootstrapFuture<String> = WrapperFuture::new();
        assert!(w.bootstrap_to().is_empty());
        w.set_bootstrap_to(vec!["peer-a".into(), "peer-b".into()]);
        assert_eq!(2, w.bootstrap_to().len());

        w.wrap(&inner);
        inner.complete(FutureState::Ok, "joined");
        assert_eq!(vec!["peer-a".to_string(), "peer-b".to_string()], w.bootstrap_to());
    }
}
