use crate::KitsuneFuture;

/// Something that can be told to stop because the future tracking it
/// was cancelled.
///
/// Cancellation is cooperative: the hook should signal the operation to
/// stop, it does not need to wait for it to do so.
pub trait CancelHook: 'static + Send + Sync {
    /// Called exactly once, when the owning future is cancelled.
    fn on_cancel(&self);
}

/// Any future can be a cancel hook of another one, e.g. a wrapper
/// cancels its inner future, a join cancels its children.
impl<F: KitsuneFuture> CancelHook for F {
    fn on_cancel(&self) {
        self.cancel();
    }
}

/// Adapter turning a closure into a [`CancelHook`].
pub struct CancelFn<F>(pub F);

impl<F> CancelHook for CancelFn<F>
where
    F: Fn() + 'static + Send + Sync,
{
    fn on_cancel(&self) {
        (self.0)()
    }
}

impl<F> std::fmt::Debug for CancelFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CancelFn").finish()
    }
}
