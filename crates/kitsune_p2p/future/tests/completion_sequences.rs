use kitsune_p2p_future::test_utils::*;
use kitsune_p2p_future::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type TestFuture = ResponseFuture<TestMessage, TestMessage>;

#[derive(Debug, Clone)]
enum Op {
    Complete(FutureState),
    Fail,
    Cancel,
    Respond(Option<MessageType>),
    SetDeferred,
    RespondDeferred(MessageType),
    CompleteDeferred,
}

fn message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Ok),
        Just(MessageType::PartiallyOk),
        Just(MessageType::NotFound),
        Just(MessageType::Denied),
        Just(MessageType::Exception),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop_oneof![
            Just(FutureState::Pending),
            Just(FutureState::Ok),
            Just(FutureState::Failed),
            Just(FutureState::Cancelled),
        ]
        .prop_map(Op::Complete),
        Just(Op::Fail),
        Just(Op::Cancel),
        proptest::option::of(message_type()).prop_map(Op::Respond),
        Just(Op::SetDeferred),
        message_type().prop_map(Op::RespondDeferred),
        Just(Op::CompleteDeferred),
    ]
}

fn apply(f: &TestFuture, op: &Op) {
    match op {
        Op::Complete(state) => {
            f.complete(*state, "complete");
        }
        Op::Fail => {
            f.fail("fail");
        }
        Op::Cancel => {
            f.cancel();
        }
        Op::Respond(t) => {
            f.respond(t.map(TestMessage::new));
        }
        Op::SetDeferred => {
            f.set_deferred();
        }
        Op::RespondDeferred(t) => {
            f.respond_deferred(TestMessage::new(*t));
        }
        Op::CompleteDeferred => {
            f.complete_deferred();
        }
    }
}

proptest! {
    #[test]
    fn first_outcome_is_final(ops in proptest::collection::vec(op(), 0..24)) {
        let f: TestFuture = ResponseFuture::new(TestMessage::request());
        let notified = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        f.add_listener(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });
        let h = hooks.clone();
        f.add_cancel_hook(Arc::new(CancelFn(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })));

        let mut first: Option<Outcome> = None;
        for op in ops.iter() {
            apply(&f, op);
            let outcome = f.outcome();
            if let Some(seen) = &first {
                prop_assert_eq!(Some(seen.clone()), outcome);
            } else {
                first = outcome;
            }
        }

        prop_assert_eq!(usize::from(f.is_done()), notified.load(Ordering::SeqCst));
        prop_assert_eq!(usize::from(f.is_cancelled()), hooks.load(Ordering::SeqCst));
    }
}
