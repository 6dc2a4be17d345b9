use crate::{FutureState, Message};

/// Policy deciding whether a request/response round trip succeeded.
///
/// Any result other than [`FutureState::Ok`] is treated as
/// [`FutureState::Failed`].
pub trait SuccessEvaluator<Req, Res>: 'static + Send + Sync {
    /// Evaluate the response to a request.
    fn evaluate(&self, request: &Req, response: &Res) -> FutureState;
}

/// The default policy: the round trip succeeded if the remote processed the
/// request and replied, whether the answer was yes or no.
///
/// Callers that care about the application level answer inspect the
/// response themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommunicationEvaluator;

impl<Req, Res: Message> SuccessEvaluator<Req, Res> for CommunicationEvaluator {
    fn evaluate(&self, _request: &Req, response: &Res) -> FutureState {
        let t = response.message_type();
        if t.is_ok() || t.is_not_ok() {
            FutureState::Ok
        } else {
            FutureState::Failed
        }
    }
}

/// Stricter policy: only an affirmative reply counts as success.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationEvaluator;

impl<Req, Res: Message> SuccessEvaluator<Req, Res> for OperationEvaluator {
    fn evaluate(&self, _request: &Req, response: &Res) -> FutureState {
        if response.message_type().is_ok() {
            FutureState::Ok
        } else {
            FutureState::Failed
        }
    }
}

/// Adapter turning a closure into a [`SuccessEvaluator`].
pub struct EvaluatorFn<F>(pub F);

impl<Req, Res, F> SuccessEvaluator<Req, Res> for EvaluatorFn<F>
where
    F: Fn(&Req, &Res) -> FutureState + 'static + Send + Sync,
{
    fn evaluate(&self, request: &Req, response: &Res) -> FutureState {
        (self.0)(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestMessage;
    use crate::MessageType;
    use test_case::test_case;

    #[test_case(MessageType::Ok, FutureState::Ok, FutureState::Ok)]
    #[test_case(MessageType::PartiallyOk, FutureState::Ok, FutureState::Ok)]
    #[test_case(MessageType::NotFound, FutureState::Ok, FutureState::Failed)]
    #[test_case(MessageType::Denied, FutureState::Ok, FutureState::Failed)]
    #[test_case(MessageType::Exception, FutureState::Failed, FutureState::Failed)]
    #[test_case(MessageType::UnknownId, FutureState::Failed, FutureState::Failed)]
    #[test_case(MessageType::Request1, FutureState::Failed, FutureState::Failed)]
    fn evaluators(t: MessageType, communication: FutureState, operation: FutureState) {
        let req = TestMessage::request();
        let res = TestMessage::new(t);
        assert_eq!(communication, CommunicationEvaluator.evaluate(&req, &res));
        assert_eq!(operation, OperationEvaluator.evaluate(&req, &res));
    }
}
