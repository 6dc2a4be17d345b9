//! Futures aggregating the outcome of many child futures.
//!
//! Both joins register every child as one of their cancel hooks, so
//! cancelling a join cancels all of its children. Children report back to
//! the join through a listener holding a weak link, so a pending child
//! never keeps a dropped join alive.

use crate::*;
use std::sync::{Arc, Weak};

/// Reason a [`ForkJoinFuture`] or [`LateJoinFuture`] with nothing to wait
/// for completes with.
pub const NOTHING_TO_JOIN: &str = "nothing to join";

/// Reason a [`LateJoinFuture`] fails with when a child did not succeed.
pub const NOT_ALL_SUCCESSFUL: &str = "not all futures successful";

/// Lock-protected state of a [`ForkJoinFuture`].
pub struct ForkJoinData<F> {
    n_finished: usize,
    total: usize,
    n_failed: usize,
    completed: Vec<F>,
    last: Option<F>,
}

/// Completes `Ok` once `n_finished` of its children succeed, or `Failed` as
/// soon as too many children failed for that to still be possible.
pub struct ForkJoinFuture<F: KitsuneFuture> {
    core: Arc<FutureCore<ForkJoinFuture<F>>>,
    children: Arc<[F]>,
    cancel_on_finish: bool,
}

impl<F: KitsuneFuture> Clone for ForkJoinFuture<F> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            children: self.children.clone(),
            cancel_on_finish: self.cancel_on_finish,
        }
    }
}

struct WeakForkJoin<F: KitsuneFuture> {
    core: Weak<FutureCore<ForkJoinFuture<F>>>,
    children: Weak<[F]>,
    cancel_on_finish: bool,
}

impl<F: KitsuneFuture> WeakForkJoin<F> {
    fn upgrade(&self) -> Option<ForkJoinFuture<F>> {
        Some(ForkJoinFuture {
            core: self.core.upgrade()?,
            children: self.children.upgrade()?,
            cancel_on_finish: self.cancel_on_finish,
        })
    }
}

impl<F: KitsuneFuture> KitsuneFuture for ForkJoinFuture<F> {
    type Data = ForkJoinData<F>;

    fn core(&self) -> &FutureCore<Self> {
        &self.core
    }
}

impl<F: KitsuneFuture> std::fmt::Debug for ForkJoinFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkJoinFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .field("children", &self.children.len())
            .finish()
    }
}

impl<F: KitsuneFuture> ForkJoinFuture<F> {
    /// Join `children`, succeeding once `n_finished` of them succeed.
    ///
    /// With `cancel_on_finish`, children still running when the join
    /// completes are cancelled.
    pub fn new(n_finished: usize, children: Vec<F>, cancel_on_finish: bool) -> Self {
        let total = children.len();
        let this = Self {
            core: Arc::new(FutureCore::new(ForkJoinData {
                n_finished,
                total,
                n_failed: 0,
                completed: Vec::new(),
                last: None,
            })),
            children: children.into(),
            cancel_on_finish,
        };

        if n_finished == 0 {
            this.finish(Outcome::ok(NOTHING_TO_JOIN));
            return this;
        }
        if total < n_finished {
            this.finish(Outcome::failed(
                FailureKind::Communication,
                format!("need {} successful futures, only {} given", n_finished, total),
            ));
            return this;
        }

        for child in this.children.iter() {
            this.core.add_cancel_hook(Arc::new(child.clone()));
        }
        for child in this.children.iter() {
            let join = this.downgrade();
            child.add_listener(move |child| {
                if let Some(join) = join.upgrade() {
                    join.on_child_done(child);
                }
            });
        }
        this
    }

    fn downgrade(&self) -> WeakForkJoin<F> {
        WeakForkJoin {
            core: Arc::downgrade(&self.core),
            children: Arc::downgrade(&self.children),
            cancel_on_finish: self.cancel_on_finish,
        }
    }

    /// Join all of `children`, succeeding only if all of them do.
    pub fn all(children: Vec<F>) -> Self {
        let n = children.len();
        Self::new(n, children, false)
    }

    fn finish(&self, outcome: Outcome) {
        if self.core.complete(self, outcome) {
            self.cancel_remaining();
        }
    }

    fn cancel_remaining(&self) {
        if !self.cancel_on_finish || self.is_cancelled() {
            return;
        }
        let running = self.children.iter().filter(|c| !c.is_done()).count();
        if running > 0 {
            tracing::debug!(running, "cancelling children of finished join");
        }
        for child in self.children.iter() {
            child.cancel();
        }
    }

    fn on_child_done(&self, child: &F) {
        let outcome = match child.outcome() {
            Some(outcome) => outcome,
            None => return,
        };
        let finished = self.core.try_complete(self, |d| {
            d.last = Some(child.clone());
            if outcome.state == FutureState::Ok {
                d.completed.push(child.clone());
                if d.completed.len() >= d.n_finished {
                    return Some(Outcome::ok(outcome.reason));
                }
                return None;
            }
            d.n_failed += 1;
            if d.total - d.n_failed < d.n_finished {
                return Some(Outcome::failed(
                    outcome.kind.unwrap_or(FailureKind::Communication),
                    format!("too many futures failed <-> {}", outcome.reason),
                ));
            }
            None
        });
        if finished {
            self.cancel_remaining();
        }
    }

    /// All children, in the order given.
    pub fn children(&self) -> &[F] {
        &self.children
    }

    /// The children that succeeded, in completion order.
    pub fn completed(&self) -> Vec<F> {
        self.core.with_data(|_, d| d.completed.clone())
    }

    /// The last child to complete before the join did.
    pub fn last(&self) -> Option<F> {
        self.core.with_data(|_, d| d.last.clone())
    }
}

/// Lock-protected state of a [`LateJoinFuture`].
pub struct LateJoinData<F> {
    expected: usize,
    added: usize,
    done: Vec<F>,
    failed_kind: Option<FailureKind>,
    last: Option<F>,
}

/// Waits for a number of children known up front, added one at a time
/// as they are created. Completes `Ok` once every expected child
/// succeeded, `Failed` once all are done and at least one did not succeed.
#[derive(Clone)]
pub struct LateJoinFuture<F: KitsuneFuture>(Arc<FutureCore<LateJoinFuture<F>>>);

impl<F: KitsuneFuture> KitsuneFuture for LateJoinFuture<F> {
    type Data = LateJoinData<F>;

    fn core(&self) -> &FutureCore<Self> {
        &self.0
    }
}

impl<F: KitsuneFuture> std::fmt::Debug for LateJoinFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LateJoinFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .finish()
    }
}

impl<F: KitsuneFuture> LateJoinFuture<F> {
    /// Wait for `expected` children.
    pub fn new(expected: usize) -> Self {
        let this = Self(Arc::new(FutureCore::new(LateJoinData {
            expected,
            added: 0,
            done: Vec::new(),
            failed_kind: None,
            last: None,
        })));
        if expected == 0 {
            this.0.complete(&this, Outcome::ok(NOTHING_TO_JOIN));
        }
        this
    }

    /// Add a child. Returns false, without tracking the child, if all
    /// expected children were already added or the join is complete.
    pub fn add(&self, child: F) -> bool {
        let accepted = self.0.with_data(|state, d| {
            if state.is_terminal() || d.added >= d.expected {
                return false;
            }
            d.added += 1;
            true
        });
        if !accepted {
            tracing::debug!("late join rejected a child");
            return false;
        }
        self.0.add_cancel_hook(Arc::new(child.clone()));
        let join = Arc::downgrade(&self.0);
        child.add_listener(move |child| {
            if let Some(core) = join.upgrade() {
                LateJoinFuture(core).on_child_done(child);
            }
        });
        true
    }

    fn on_child_done(&self, child: &F) {
        let outcome = match child.outcome() {
            Some(outcome) => outcome,
            None => return,
        };
        self.0.try_complete(self, |d| {
            d.last = Some(child.clone());
            d.done.push(child.clone());
            if outcome.state != FutureState::Ok {
                d.failed_kind = outcome.kind.or(Some(FailureKind::Communication));
            }
            if d.done.len() < d.expected {
                return None;
            }
            Some(match d.failed_kind {
                None => Outcome::ok(outcome.reason),
                Some(kind) => Outcome::failed(kind, NOT_ALL_SUCCESSFUL),
            })
        });
    }

    /// The children that completed so far, in completion order.
    pub fn futures_done(&self) -> Vec<F> {
        self.0.with_data(|_, d| d.done.clone())
    }

    /// The last child to complete.
    pub fn last(&self) -> Option<F> {
        self.0.with_data(|_, d| d.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DropCounter, DropToken};
    use pretty_assertions::assert_eq;

    fn children(n: usize) -> Vec<BaseFuture> {
        (0..n).map(|_| BaseFuture::new()).collect()
    }

    fn tracked_children(n: usize, drops: &DropCounter) -> Vec<WrapperFuture<DropToken>> {
        (0..n)
            .map(|_| {
                let child = WrapperFuture::new();
                child.set_extra(drops.token());
                child
            })
            .collect()
    }

    #[test]
    fn fork_join_succeeds_after_n() {
        let c = children(3);
        let j = ForkJoinFuture::new(2, c.clone(), false);
        c[1].complete(FutureState::Ok, "b");
        assert_eq!(FutureState::Pending, j.state());
        c[0].fail("peer unreachable");
        assert_eq!(FutureState::Pending, j.state());
        c[2].complete(FutureState::Ok, "c");

        assert_eq!(FutureState::Ok, j.state());
        assert_eq!(Some("c".to_string()), j.reason());
        let completed: Vec<_> = j.completed().iter().map(|f| f.reason()).collect();
        assert_eq!(vec![Some("b".to_string()), Some("c".to_string())], completed);
        assert_eq!(Some("c".to_string()), j.last().and_then(|f| f.reason()));
    }

    #[test]
    fn fork_join_fails_once_success_is_impossible() {
        let c = children(3);
        let j = ForkJoinFuture::new(2, c.clone(), false);
        c[0].fail("first down");
        assert_eq!(FutureState::Pending, j.state());
        c[1].fail_with(FailureKind::Application, "Denied");

        assert_eq!(FutureState::Failed, j.state());
        let o = j.outcome().unwrap();
        assert_eq!("too many futures failed <-> Denied", o.reason);
        assert_eq!(Some(FailureKind::Application), o.kind);
        // the last child is left running
        assert_eq!(FutureState::Pending, c[2].state());
    }

    #[test]
    fn fork_join_cancels_remaining_on_finish() {
        let c = children(3);
        let j = ForkJoinFuture::new(1, c.clone(), true);
        c[0].complete(FutureState::Ok, "fastest");
        assert_eq!(FutureState::Ok, j.state());
        assert_eq!(FutureState::Ok, c[0].state());
        assert_eq!(FutureState::Cancelled, c[1].state());
        assert_eq!(FutureState::Cancelled, c[2].state());
        assert_eq!(1, j.completed().len());
    }

    #[test]
    fn cancelling_fork_join_cancels_children() {
        let c = children(2);
        let j = ForkJoinFuture::all(c.clone());
        assert!(j.cancel());
        assert!(c.iter().all(|c| c.is_cancelled()));
        assert_eq!(FutureState::Cancelled, j.state());
    }

    #[test]
    fn fork_join_edge_counts() {
        let j = ForkJoinFuture::<BaseFuture>::new(0, Vec::new(), false);
        assert_eq!(Some(NOTHING_TO_JOIN.to_string()), j.reason());
        assert!(j.is_success());

        let j = ForkJoinFuture::new(2, children(1), false);
        assert!(j.is_failed());
    }

    #[test]
    fn fork_join_of_finished_children() {
        let c = children(2);
        c[0].complete(FutureState::Ok, "a");
        c[1].complete(FutureState::Ok, "b");
        let j = ForkJoinFuture::all(c);
        assert!(j.is_success());
        assert_eq!(2, j.completed().len());
    }

    #[test]
    fn late_join_all_successful() {
        let j = LateJoinFuture::new(2);
        let a = BaseFuture::new();
        let b = BaseFuture::new();
        assert!(j.add(a.clone()));
        a.complete(FutureState::Ok, "a");
        assert_eq!(FutureState::Pending, j.state());
        assert!(j.add(b.clone()));
        assert!(!j.add(BaseFuture::new()));
        b.complete(FutureState::Ok, "b");

        assert!(j.is_success());
        assert_eq!(2, j.futures_done().len());
        assert_eq!(Some("b".to_string()), j.last().and_then(|f| f.reason()));
    }

    #[test]
    fn late_join_one_failure() {
        let j = LateJoinFuture::new(2);
        let a = BaseFuture::new();
        let b = BaseFuture::new();
        j.add(a.clone());
        j.add(b.clone());
        a.fail("peer unreachable");
        assert_eq!(FutureState::Pending, j.state());
        b.complete(FutureState::Ok, "b");

        assert_eq!(FutureState::Failed, j.state());
        assert_eq!(Some(NOT_ALL_SUCCESSFUL.to_string()), j.reason());
        assert!(!j.add(BaseFuture::new()));
    }

    #[test]
    fn late_join_cancel_reaches_children() {
        let j = LateJoinFuture::new(3);
        let a = BaseFuture::new();
        j.add(a.clone());
        j.cancel();
        assert!(a.is_cancelled());
        assert!(!j.add(BaseFuture::new()));
    }

    #[test]
    fn late_join_expecting_nothing() {
        let j = LateJoinFuture::<BaseFuture>::new(0);
        assert!(j.is_success());
        assert!(!j.add(BaseFuture::new()));
    }

    #[test]
    fn pending_children_do_not_keep_a_fork_join_alive() {
        let drops = DropCounter::default();
        let j = ForkJoinFuture::all(tracked_children(2, &drops));
        assert_eq!(0, drops.count());
        drop(j);
        assert_eq!(2, drops.count());
    }

    #[test]
    fn children_outliving_a_fork_join_complete_quietly() {
        let drops = DropCounter::default();
        let c = tracked_children(2, &drops);
        let j = ForkJoinFuture::new(1, c.clone(), true);
        drop(j);
        assert!(c[0].complete(FutureState::Ok, "a"));
        // nothing left to cancel the other child
        assert_eq!(FutureState::Pending, c[1].state());
        drop(c);
        assert_eq!(2, drops.count());
    }

    #[test]
    fn pending_children_do_not_keep_a_late_join_alive() {
        let drops = DropCounter::default();
        let j = LateJoinFuture::new(3);
        for child in tracked_children(2, &drops) {
            assert!(j.add(child));
        }
        drop(j);
        assert_eq!(2, drops.count());
    }
}
