//! The completion state machine shared by every kitsune future.
//!
//! A [`FutureCore`] guards everything about one future behind a single
//! mutex: state, reason, failure kind, the concrete future's own data, the
//! listener list and the cancel hooks. Transitions only hold the lock long
//! enough to flip the state and snapshot the listeners; listeners and hooks
//! run after it is dropped, so they may freely call back into the future.

use crate::config::KitsuneFutureTuning;
use crate::*;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A listener observing the terminal state of a future of type `F`.
pub type Listener<F> = Box<dyn FnOnce(&F) + 'static + Send>;

struct CoreInner<F: KitsuneFuture> {
    state: FutureState,
    reason: Option<String>,
    kind: Option<FailureKind>,
    data: F::Data,
    listeners: Vec<Listener<F>>,
    cancel_hooks: Vec<Arc<dyn CancelHook>>,
    listeners_notified: bool,
}

/// The lock-protected completion state of a future of type `F`.
///
/// Concrete futures hold an `Arc<FutureCore<Self>>` and expose it through
/// [`KitsuneFuture::core`]. `F::Data` is the concrete future's own state,
/// protected by the same lock as the completion state.
pub struct FutureCore<F: KitsuneFuture> {
    inner: Mutex<CoreInner<F>>,
    cond: Condvar,
    tuning: KitsuneFutureTuning,
}

impl<F: KitsuneFuture> Drop for FutureCore<F> {
    fn drop(&mut self) {
        F::release_data(&mut self.inner.get_mut().data);
    }
}

impl<F: KitsuneFuture> FutureCore<F> {
    /// Construct a pending core with default tuning.
    pub fn new(data: F::Data) -> Self {
        Self::with_tuning(data, Arc::new(KitsuneFutureTuningParams::default()))
    }

    /// Construct a pending core.
    pub fn with_tuning(data: F::Data, tuning: KitsuneFutureTuning) -> Self {
        Self {
            inner: Mutex::new(CoreInner {
                state: FutureState::Pending,
                reason: None,
                kind: None,
                data,
                listeners: Vec::new(),
                cancel_hooks: Vec::new(),
                listeners_notified: false,
            }),
            cond: Condvar::new(),
            tuning,
        }
    }

    /// The tuning params this future was created with.
    pub fn tuning(&self) -> &KitsuneFutureTuning {
        &self.tuning
    }

    /// Current state.
    pub fn state(&self) -> FutureState {
        self.inner.lock().state
    }

    /// Current reason, `None` while pending.
    pub fn reason(&self) -> Option<String> {
        self.inner.lock().reason.clone()
    }

    /// The terminal outcome, `None` while pending.
    pub fn outcome(&self) -> Option<Outcome> {
        let inner = self.inner.lock();
        if !inner.state.is_terminal() {
            return None;
        }
        Some(Outcome {
            state: inner.state,
            reason: inner.reason.clone().unwrap_or_default(),
            kind: inner.kind,
        })
    }

    /// Access the concrete future's data under the lock.
    /// The closure also receives the current state.
    pub fn with_data<R>(&self, f: impl FnOnce(FutureState, &mut F::Data) -> R) -> R {
        let mut inner = self.inner.lock();
        let state = inner.state;
        f(state, &mut inner.data)
    }

    /// Attempt a terminal transition.
    ///
    /// If the future is still pending, `f` runs under the lock and may
    /// mutate the data; returning `Some(outcome)` completes the future with
    /// it, `None` leaves it pending. Returns true only if this call
    /// completed the future.
    pub fn try_complete(
        &self,
        handle: &F,
        f: impl FnOnce(&mut F::Data) -> Option<Outcome>,
    ) -> bool {
        let (outcome, listeners, hooks) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            let outcome = match f(&mut inner.data) {
                None => return false,
                Some(outcome) if !outcome.state.is_terminal() => return false,
                Some(outcome) => outcome,
            };
            inner.state = outcome.state;
            inner.reason = Some(outcome.reason.clone());
            inner.kind = match outcome.state {
                FutureState::Ok => None,
                _ => outcome.kind.or(Some(FailureKind::Communication)),
            };
            F::release_data(&mut inner.data);
            let hooks = if outcome.state == FutureState::Cancelled {
                std::mem::take(&mut inner.cancel_hooks)
            } else {
                inner.cancel_hooks.clear();
                Vec::new()
            };
            let listeners = std::mem::take(&mut inner.listeners);
            self.cond.notify_all();
            (outcome, listeners, hooks)
        };

        match outcome.state {
            FutureState::Cancelled => tracing::debug!(
                reason = %outcome.reason,
                hook_count = hooks.len(),
                "future cancelled"
            ),
            state => tracing::trace!(%state, reason = %outcome.reason, "future complete"),
        }

        for hook in hooks {
            Self::call_hook(hook);
        }

        self.notify_listeners(handle, listeners);
        true
    }

    /// Complete with a fixed outcome.
    pub fn complete(&self, handle: &F, outcome: Outcome) -> bool {
        self.try_complete(handle, move |_| Some(outcome))
    }

    /// Run the listeners, then wake anyone in `await_listeners`.
    fn notify_listeners(&self, handle: &F, listeners: Vec<Listener<F>>) {
        for listener in listeners {
            self.call_listener(handle, listener);
        }
        let mut inner = self.inner.lock();
        inner.listeners_notified = true;
        self.cond.notify_all();
    }

    fn call_listener(&self, handle: &F, listener: Listener<F>) {
        let start = Instant::now();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(handle)));
        if res.is_err() {
            tracing::error!("future listener panicked");
        }
        let elapsed = start.elapsed();
        if elapsed > self.tuning.slow_listener_warn() {
            tracing::warn!(elapsed_ms = %elapsed.as_millis(), "slow future listener");
        }
    }

    fn call_hook(hook: Arc<dyn CancelHook>) {
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_cancel()));
        if res.is_err() {
            tracing::error!("future cancel hook panicked");
        }
    }

    /// Register a listener, or run it right away if already complete.
    pub fn add_listener(&self, handle: &F, listener: Listener<F>) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_terminal() {
                inner.listeners.push(listener);
                return;
            }
        }
        self.call_listener(handle, listener);
    }

    /// Register a cancel hook. Runs it right away if already cancelled,
    /// drops it if complete in any other way.
    pub fn add_cancel_hook(&self, hook: Arc<dyn CancelHook>) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                FutureState::Pending => {
                    inner.cancel_hooks.push(hook);
                    return;
                }
                FutureState::Cancelled => (),
                _ => return,
            }
        }
        Self::call_hook(hook);
    }

    /// Block until complete, or until the timeout elapses.
    pub fn await_completion(&self, timeout: Option<Duration>) -> FutureState {
        let mut inner = self.inner.lock();
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        while !inner.state.is_terminal() {
            match deadline {
                None => self.cond.wait(&mut inner),
                Some(deadline) => {
                    if self.cond.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        inner.state
    }

    /// Block until complete and every listener registered before completion
    /// has returned, or until the timeout elapses.
    /// Returns true if the listeners have run.
    pub fn await_listeners(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.inner.lock();
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        while !inner.listeners_notified {
            match deadline {
                None => self.cond.wait(&mut inner),
                Some(deadline) => {
                    if self.cond.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        inner.listeners_notified
    }
}

/// Operations common to every kitsune future.
///
/// Implementors are cheap, cloneable handles to a shared [`FutureCore`].
/// Methods that register something return a clone of the concrete future,
/// so calls chain without losing the concrete type.
pub trait KitsuneFuture: 'static + Clone + Send + Sync + Sized {
    /// The concrete future's own lock-protected state.
    type Data: 'static + Send;

    /// Access the shared core.
    fn core(&self) -> &FutureCore<Self>;

    /// Give back resources held in `data` that nothing will read anymore.
    /// Runs under the lock when the future leaves `Pending`, and again when
    /// the last handle is dropped, so it must be idempotent.
    fn release_data(_data: &mut Self::Data) {}

    /// Current state.
    fn state(&self) -> FutureState {
        self.core().state()
    }

    /// Current reason, `None` while pending.
    fn reason(&self) -> Option<String> {
        self.core().reason()
    }

    /// The terminal outcome, `None` while pending.
    fn outcome(&self) -> Option<Outcome> {
        self.core().outcome()
    }

    /// Has this future left `Pending`?
    fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Did this future complete `Ok`?
    fn is_success(&self) -> bool {
        self.state() == FutureState::Ok
    }

    /// Did this future fail?
    fn is_failed(&self) -> bool {
        self.state() == FutureState::Failed
    }

    /// Was this future cancelled?
    fn is_cancelled(&self) -> bool {
        self.state() == FutureState::Cancelled
    }

    /// The terminal failure as an error. `None` while pending or when `Ok`.
    fn error(&self) -> Option<KitsuneFutureError> {
        let outcome = self.outcome()?;
        outcome
            .kind
            .map(|kind| KitsuneFutureError::from_kind(kind, outcome.reason))
    }

    /// Complete with the given state and reason. Returns false if the
    /// future was already complete, or if `state` is `Pending`.
    /// Completing as `Cancelled` runs the cancel hooks.
    fn complete(&self, state: FutureState, reason: impl Into<String>) -> bool {
        match Outcome::from_state(state, reason) {
            Some(outcome) => self.core().complete(self, outcome),
            None => false,
        }
    }

    /// Fail with a communication failure.
    fn fail(&self, reason: impl Into<String>) -> bool {
        self.fail_with(FailureKind::Communication, reason)
    }

    /// Fail with a specific failure kind.
    fn fail_with(&self, kind: FailureKind, reason: impl Into<String>) -> bool {
        self.core().complete(self, Outcome::failed(kind, reason))
    }

    /// Fail because another future failed. The reason records both,
    /// and the origin's failure kind is kept.
    fn fail_from<O: KitsuneFuture>(&self, reason: impl Into<String>, origin: &O) -> bool {
        let reason = reason.into();
        let (origin_reason, kind) = match origin.outcome() {
            Some(o) => (o.reason, o.kind.unwrap_or(FailureKind::Communication)),
            None => ("pending".to_string(), FailureKind::Communication),
        };
        self.fail_with(kind, format!("{} <-> {}", reason, origin_reason))
    }

    /// Cancel this future if it is still pending.
    /// Cancel hooks run exactly once each, in registration order,
    /// followed by the listeners.
    fn cancel(&self) -> bool {
        self.core().complete(self, Outcome::cancelled())
    }

    /// Observe the terminal state of this future.
    ///
    /// If already complete, `f` runs synchronously on this thread before
    /// this call returns. Otherwise it runs on whichever thread completes
    /// the future. Listeners registered before completion run in
    /// registration order. A listener registered after completion runs
    /// immediately on the registering thread, so it may overtake earlier
    /// listeners that the completing thread is still delivering.
    fn add_listener(&self, f: impl FnOnce(&Self) + 'static + Send) -> Self {
        self.core().add_listener(self, Box::new(f));
        self.clone()
    }

    /// Register something to stop when this future is cancelled.
    fn add_cancel_hook(&self, hook: Arc<dyn CancelHook>) -> Self {
        self.core().add_cancel_hook(hook);
        self.clone()
    }

    /// Block until complete, or until the timeout elapses.
    /// Returns `Pending` if the timeout elapsed first.
    fn await_completion(&self, timeout: Option<Duration>) -> FutureState {
        self.core().await_completion(timeout)
    }

    /// [`KitsuneFuture::await_completion`] using the tuned default timeout.
    fn await_completion_default(&self) -> FutureState {
        let timeout = self.core().tuning().default_await_timeout();
        self.core().await_completion(timeout)
    }

    /// Block until complete and all listeners registered before
    /// completion have returned. Must not be called from one of those
    /// listeners.
    fn await_listeners(&self, timeout: Option<Duration>) -> bool {
        self.core().await_listeners(timeout)
    }

    /// An awaitable resolving to the terminal state.
    fn wait(&self) -> BoxFuture<'static, FutureState> {
        let (s, r) = futures::channel::oneshot::channel();
        self.add_listener(move |f| {
            let _ = s.send(f.state());
        });
        let this = self.clone();
        async move {
            match r.await {
                Ok(state) => state,
                Err(_) => this.state(),
            }
        }
        .boxed()
    }
}

/// The simplest future: no data beyond its completion state.
/// Useful as the building block for operations that only need to report
/// success, failure or cancellation.
#[derive(Clone)]
pub struct BaseFuture(Arc<FutureCore<BaseFuture>>);

impl KitsuneFuture for BaseFuture {
    type Data = ();

    fn core(&self) -> &FutureCore<Self> {
        &self.0
    }
}

impl Default for BaseFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseFuture {
    /// Construct a new pending future.
    pub fn new() -> Self {
        Self(Arc::new(FutureCore::new(())))
    }

    /// Construct a new pending future with specific tuning.
    pub fn with_tuning(tuning: KitsuneFutureTuning) -> Self {
        Self(Arc::new(FutureCore::with_tuning((), tuning)))
    }
}

impl std::fmt::Debug for BaseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .finish()
    }
}
