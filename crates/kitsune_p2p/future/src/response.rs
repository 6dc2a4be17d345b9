//! Futures bound to a request/response round trip.

use crate::config::KitsuneFutureTuning;
use crate::*;
use std::sync::Arc;

/// Reason used when a round trip completed without a response payload.
pub const NOTHING_TO_DELIVER: &str = "nothing to deliver";

/// Per-future extension data carried by a [`ResponseFuture`],
/// e.g. the payload slot of a [`PayloadFuture`].
///
/// Every method runs under the future's lock. `on_complete` runs right
/// before a response outcome is committed and may change the outcome.
pub trait ResponseExt<Res>: 'static + Send {
    /// Adjust extension state for the response about to be committed.
    fn on_complete(&mut self, response: &mut Option<Res>, outcome: &mut Outcome);

    /// The future ended or was dropped. Give back whatever the recorded
    /// response still holds. May run more than once.
    fn release(&mut self, _response: &mut Option<Res>) {}

    /// A response arrived that will never be recorded.
    fn discard(&mut self, _response: Res) {}
}

impl<Res> ResponseExt<Res> for () {
    fn on_complete(&mut self, _response: &mut Option<Res>, _outcome: &mut Outcome) {}
}

#[derive(Debug)]
enum Deferred {
    /// The first response completes the future.
    Direct,

    /// The next response is recorded but not committed.
    Armed,

    /// A response was recorded; only the deferred completion commits it.
    Recorded(Outcome),
}

/// Lock-protected state of a [`ResponseFuture`].
pub struct ResponseData<Res, E> {
    response: Option<Res>,
    deferred: Deferred,
    attempted: bool,
    ext: E,
}

impl<Res, E> ResponseData<Res, E> {
    pub(crate) fn ext_mut(&mut self) -> &mut E {
        &mut self.ext
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Option<Res>, &mut E) {
        (&mut self.response, &mut self.ext)
    }
}

/// A future tracking the response to one outgoing request.
///
/// The transport calls [`ResponseFuture::respond`] exactly once per attempt,
/// with `None` if there was nothing to deliver. For replies that arrive out
/// of band, the future is armed with [`ResponseFuture::set_deferred`], the
/// first response is recorded, and [`ResponseFuture::complete_deferred`]
/// commits it later.
pub struct ResponseFuture<Req, Res, E = ()>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    core: Arc<FutureCore<Self>>,
    request: Arc<Req>,
    evaluator: Arc<dyn SuccessEvaluator<Req, Res>>,
}

impl<Req, Res, E> Clone for ResponseFuture<Req, Res, E>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            request: self.request.clone(),
            evaluator: self.evaluator.clone(),
        }
    }
}

impl<Req, Res, E> KitsuneFuture for ResponseFuture<Req, Res, E>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    type Data = ResponseData<Res, E>;

    fn core(&self) -> &FutureCore<Self> {
        &self.core
    }

    fn release_data(data: &mut Self::Data) {
        data.ext.release(&mut data.response);
    }
}

impl<Req, Res, E> std::fmt::Debug for ResponseFuture<Req, Res, E>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("state", &self.state())
            .field("reason", &self.reason())
            .field("deferred", &self.is_deferred())
            .finish()
    }
}

/// Builder for [`ResponseFuture`]s, parameterized over the extension type
/// so the built future has its final concrete type.
pub struct ResponseFutureBuilder<Req, Res, E> {
    request: Arc<Req>,
    evaluator: Arc<dyn SuccessEvaluator<Req, Res>>,
    tuning: KitsuneFutureTuning,
    ext: E,
}

impl<Req, Res, E> ResponseFutureBuilder<Req, Res, E>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    /// Use a different success evaluator.
    pub fn evaluator(mut self, evaluator: impl SuccessEvaluator<Req, Res>) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Use specific tuning params.
    pub fn tuning(mut self, tuning: KitsuneFutureTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Attach a payload slot, turning the result into a [`PayloadFuture`].
    pub fn payload<T>(self, mode: PayloadMode) -> ResponseFutureBuilder<Req, Res, PayloadSlot<T>>
    where
        Res: PayloadMessage,
        T: PayloadObject,
    {
        ResponseFutureBuilder {
            request: self.request,
            evaluator: self.evaluator,
            tuning: self.tuning,
            ext: PayloadSlot::new(mode),
        }
    }

    /// Attach a payload slot using the tuned default payload mode.
    pub fn payload_default<T>(self) -> ResponseFutureBuilder<Req, Res, PayloadSlot<T>>
    where
        Res: PayloadMessage,
        T: PayloadObject,
    {
        let mode = self.tuning.default_payload_mode;
        self.payload(mode)
    }

    /// Build the pending future.
    pub fn build(self) -> ResponseFuture<Req, Res, E> {
        let data = ResponseData {
            response: None,
            deferred: Deferred::Direct,
            attempted: false,
            ext: self.ext,
        };
        ResponseFuture {
            core: Arc::new(FutureCore::with_tuning(data, self.tuning)),
            request: self.request,
            evaluator: self.evaluator,
        }
    }
}

impl<Req, Res> ResponseFuture<Req, Res, ()>
where
    Req: 'static + Send + Sync,
    Res: Message,
{
    /// Start building a future for this request.
    pub fn builder(request: Req) -> ResponseFutureBuilder<Req, Res, ()> {
        ResponseFutureBuilder {
            request: Arc::new(request),
            evaluator: Arc::new(CommunicationEvaluator),
            tuning: Arc::new(KitsuneFutureTuningParams::default()),
            ext: (),
        }
    }

    /// A future for this request, using the communication evaluator.
    pub fn new(request: Req) -> Self {
        Self::builder(request).build()
    }
}

impl<Req, Res, E> ResponseFuture<Req, Res, E>
where
    Req: 'static + Send + Sync,
    Res: Message,
    E: ResponseExt<Res>,
{
    /// The outgoing request.
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// Inspect the recorded response, if any.
    pub fn with_response<R>(&self, f: impl FnOnce(Option<&Res>) -> R) -> R {
        self.core.with_data(|_, d| f(d.response.as_ref()))
    }

    /// A copy of the recorded response, if any.
    pub fn response(&self) -> Option<Res>
    where
        Res: Clone,
    {
        self.with_response(|r| r.cloned())
    }

    /// Is this future waiting for a deferred reply?
    pub fn is_deferred(&self) -> bool {
        self.core
            .with_data(|_, d| !matches!(d.deferred, Deferred::Direct))
    }

    /// Arm deferred completion: the next response is recorded, but only
    /// [`ResponseFuture::complete_deferred`] commits it.
    ///
    /// Only possible once, before any response was delivered.
    pub fn set_deferred(&self) -> bool {
        self.core.with_data(|state, d| {
            if state.is_terminal() || d.attempted || !matches!(d.deferred, Deferred::Direct) {
                return false;
            }
            d.deferred = Deferred::Armed;
            true
        })
    }

    fn evaluate(&self, response: Option<&Res>) -> Outcome {
        match response {
            None => Outcome::ok(NOTHING_TO_DELIVER),
            Some(res) => {
                let reason = res.describe();
                match self.evaluator.evaluate(&self.request, res) {
                    FutureState::Ok => Outcome::ok(reason),
                    _ => Outcome::failed(FailureKind::Application, reason),
                }
            }
        }
    }

    /// Deliver the response to the request, `None` if there was no
    /// response payload.
    ///
    /// Returns true if this response took effect: either it completed
    /// the future, or the future was armed for deferred completion and
    /// this response was recorded. Returns false if the future was already
    /// complete, or a deferred response was recorded first. A response
    /// that does not take effect is discarded through the extension.
    pub fn respond(&self, response: Option<Res>) -> bool {
        let mut outcome = self.evaluate(response.as_ref());
        let mut pending = Some(response);
        let mut recorded = false;
        let completed = self.core.try_complete(self, |d| {
            let response = pending.take().flatten();
            d.attempted = true;
            match d.deferred {
                Deferred::Recorded(_) => {
                    tracing::warn!("response after deferred response was recorded, dropping it");
                    if let Some(res) = response {
                        d.ext.discard(res);
                    }
                    None
                }
                Deferred::Armed => {
                    d.response = response;
                    d.deferred = Deferred::Recorded(outcome);
                    recorded = true;
                    None
                }
                Deferred::Direct => {
                    d.response = response;
                    d.ext.on_complete(&mut d.response, &mut outcome);
                    Some(outcome)
                }
            }
        });
        if let Some(Some(res)) = pending {
            tracing::trace!("response after completion, dropping it");
            self.core.with_data(|_, d| d.ext.discard(res));
        }
        completed || recorded
    }

    /// Record the response for a future armed with
    /// [`ResponseFuture::set_deferred`], without completing it.
    ///
    /// Returns false if the future is not armed, a response was already
    /// recorded, or the future already completed (e.g. it was cancelled),
    /// in which case the caller should stop the deferred work.
    pub fn respond_deferred(&self, response: Res) -> bool {
        let outcome = self.evaluate(Some(&response));
        self.core.with_data(move |state, d| {
            if state.is_terminal() || !matches!(d.deferred, Deferred::Armed) {
                d.ext.discard(response);
                return false;
            }
            d.attempted = true;
            d.response = Some(response);
            d.deferred = Deferred::Recorded(outcome);
            true
        })
    }

    /// Commit a recorded deferred response.
    ///
    /// Returns false if nothing was recorded, or the future already
    /// completed in some other way.
    pub fn complete_deferred(&self) -> bool {
        self.core.try_complete(self, |d| {
            let mut outcome = match &d.deferred {
                Deferred::Recorded(outcome) => outcome.clone(),
                _ => return None,
            };
            d.ext.on_complete(&mut d.response, &mut outcome);
            Some(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestMessage;
    use pretty_assertions::assert_eq;

    type TestFuture = ResponseFuture<TestMessage, TestMessage>;

    fn future() -> TestFuture {
        ResponseFuture::new(TestMessage::request())
    }

    #[test]
    fn respond_nothing_is_ok() {
        let f = future();
        assert!(f.respond(None));
        assert_eq!(FutureState::Ok, f.state());
        assert_eq!(Some(NOTHING_TO_DELIVER.to_string()), f.reason());
        assert!(f.response().is_none());
    }

    #[test]
    fn negative_reply_is_still_communication_success() {
        let f = future();
        assert!(f.respond(Some(TestMessage::new(MessageType::NotFound))));
        assert_eq!(FutureState::Ok, f.state());
        assert_eq!(Some("NotFound".to_string()), f.reason());
        assert_eq!(
            Some(MessageType::NotFound),
            f.with_response(|r| r.map(|r| r.message_type()))
        );
    }

    #[test]
    fn failed_evaluation_reason_is_type_description() {
        let f = future();
        let res = TestMessage::new(MessageType::Exception);
        let description = res.describe();
        assert!(f.respond(Some(res)));
        assert_eq!(FutureState::Failed, f.state());
        assert_eq!(Some(description), f.reason());
        assert_eq!(
            Some(FailureKind::Application),
            f.error().and_then(|e| e.kind())
        );
    }

    #[test]
    fn evaluator_is_swappable() {
        let f: TestFuture = ResponseFuture::builder(TestMessage::request())
            .evaluator(OperationEvaluator)
            .build();
        f.respond(Some(TestMessage::new(MessageType::Denied)));
        assert_eq!(FutureState::Failed, f.state());

        let f: TestFuture = ResponseFuture::builder(TestMessage::request())
            .evaluator(EvaluatorFn(|_: &TestMessage, _: &TestMessage| {
                FutureState::Ok
            }))
            .build();
        f.respond(Some(TestMessage::new(MessageType::Exception)));
        assert_eq!(FutureState::Ok, f.state());
    }

    #[test]
    fn respond_after_completion_is_dropped() {
        let f = future();
        assert!(f.fail("channel closed"));
        assert!(!f.respond(Some(TestMessage::new(MessageType::Ok))));
        assert_eq!(FutureState::Failed, f.state());
        assert!(f.response().is_none());
    }

    #[test]
    fn deferred_first_writer_wins() {
        let f = future();
        assert!(f.set_deferred());
        assert!(!f.set_deferred());

        assert!(f.respond_deferred(TestMessage::new(MessageType::PartiallyOk)));
        assert_eq!(FutureState::Pending, f.state());

        // the direct response lost the race
        assert!(!f.respond(Some(TestMessage::new(MessageType::Exception))));
        assert!(!f.respond_deferred(TestMessage::new(MessageType::Denied)));
        assert_eq!(FutureState::Pending, f.state());

        assert!(f.complete_deferred());
        assert!(!f.complete_deferred());
        assert_eq!(FutureState::Ok, f.state());
        assert_eq!(Some("PartiallyOk".to_string()), f.reason());
        assert_eq!(
            Some(MessageType::PartiallyOk),
            f.with_response(|r| r.map(|r| r.message_type()))
        );
    }

    #[test]
    fn first_respond_on_armed_future_only_records() {
        let f = future();
        f.set_deferred();
        assert!(f.respond(Some(TestMessage::new(MessageType::Ok))));
        assert_eq!(FutureState::Pending, f.state());
        assert!(!f.respond_deferred(TestMessage::new(MessageType::Ok)));
        assert!(f.complete_deferred());
        assert_eq!(FutureState::Ok, f.state());
    }

    #[test]
    fn deferred_preempted_by_cancel() {
        let f = future();
        f.set_deferred();
        assert!(f.cancel());
        assert!(!f.respond_deferred(TestMessage::new(MessageType::Ok)));
        assert!(!f.complete_deferred());
        assert_eq!(FutureState::Cancelled, f.state());
    }

    #[test]
    fn deferred_needs_arming_and_a_recording() {
        let f = future();
        assert!(!f.respond_deferred(TestMessage::new(MessageType::Ok)));
        assert!(!f.complete_deferred());
        f.set_deferred();
        assert!(!f.complete_deferred());
        assert_eq!(FutureState::Pending, f.state());
    }

    #[test]
    fn cannot_arm_after_a_response() {
        let f = future();
        f.respond(None);
        assert!(!f.set_deferred());
        assert!(!f.is_deferred());
    }
}
