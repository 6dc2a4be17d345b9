//! Response futures that materialize the response payload.
//!
//! The payload arrives in a pooled network buffer owned by the transport.
//! It is copied out and the buffer released exactly once, either when the
//! future completes or on first access through [`PayloadFuture::raw_payload`]
//! / [`PayloadFuture::decoded_payload`], whichever comes first. Both paths
//! run under the future's lock and check the same `converted` flag.
//!
//! A recorded payload that was never converted is released without a copy
//! when the future ends some other way (cancelled, failed, or dropped).
//! Responses that are never recorded have their buffers released on arrival.

use crate::*;
use std::sync::Arc;

/// How a payload future converts its payload on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadMode {
    /// Copy the readable bytes out of the network buffer.
    Raw,

    /// Copy the bytes out, then decode them into the payload object.
    /// A decode failure fails the future.
    Decoded,
}

impl std::fmt::Display for PayloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Decoded => f.write_str("decoded"),
        }
    }
}

impl std::str::FromStr for PayloadMode {
    type Err = KitsuneFutureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "decoded" => Ok(Self::Decoded),
            oth => Err(format!("invalid payload mode: {}", oth).into()),
        }
    }
}

/// Types a payload can be decoded into.
pub trait PayloadObject: 'static + Send + Sync + serde::de::DeserializeOwned {}
impl<T> PayloadObject for T where T: 'static + Send + Sync + serde::de::DeserializeOwned {}

/// The payload state of a [`PayloadFuture`].
pub struct PayloadSlot<T> {
    mode: PayloadMode,
    raw: Option<Arc<[u8]>>,
    object: Option<Arc<T>>,
    converted: bool,
    buffer_released: bool,
}

impl<T: PayloadObject> PayloadSlot<T> {
    pub(crate) fn new(mode: PayloadMode) -> Self {
        Self {
            mode,
            raw: None,
            object: None,
            converted: false,
            buffer_released: false,
        }
    }

    /// Copy the payload out of the response buffer and release it.
    /// No-op once converted. Nothing is converted until a response exists.
    fn materialize<Res: PayloadMessage>(&mut self, response: &mut Option<Res>) {
        if self.converted {
            return;
        }
        let res = match response.as_mut() {
            Some(res) => res,
            None => return,
        };
        self.converted = true;
        if let Some(buf) = res.take_payload() {
            self.raw = Some(Arc::from(buf.readable()));
            buf.release();
            self.buffer_released = true;
            tracing::trace!(
                len = self.raw.as_ref().map(|r| r.len()).unwrap_or(0),
                "payload materialized"
            );
        }
    }

    /// Release the buffer of a recorded response that will not be converted.
    fn release_unread<Res: PayloadMessage>(&mut self, response: &mut Option<Res>) {
        if self.converted {
            return;
        }
        let res = match response.as_mut() {
            Some(res) => res,
            None => return,
        };
        self.converted = true;
        if let Some(buf) = res.take_payload() {
            buf.release();
            self.buffer_released = true;
            tracing::trace!("unread payload released");
        }
    }

    fn decode(&mut self) -> KitsuneFutureResult<Option<Arc<T>>> {
        if let Some(object) = &self.object {
            return Ok(Some(object.clone()));
        }
        let raw = match &self.raw {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let object = Arc::new(rmp_serde::from_slice::<T>(raw)?);
        self.object = Some(object.clone());
        Ok(Some(object))
    }
}

impl<Res, T> ResponseExt<Res> for PayloadSlot<T>
where
    Res: PayloadMessage,
    T: PayloadObject,
{
    fn on_complete(&mut self, response: &mut Option<Res>, outcome: &mut Outcome) {
        self.materialize(response);
        if self.mode != PayloadMode::Decoded {
            return;
        }
        if let Err(e) = self.decode() {
            tracing::debug!(?e, "payload decode failed on completion");
            if outcome.state == FutureState::Ok {
                *outcome = Outcome::failed(FailureKind::Decode, e.to_string());
            }
        }
    }

    fn release(&mut self, response: &mut Option<Res>) {
        self.release_unread(response);
    }

    fn discard(&mut self, mut response: Res) {
        if let Some(buf) = response.take_payload() {
            buf.release();
        }
    }
}

/// A [`ResponseFuture`] that materializes its payload.
pub type PayloadFuture<Req, Res, T> = ResponseFuture<Req, Res, PayloadSlot<T>>;

impl<Req, Res, T> ResponseFuture<Req, Res, PayloadSlot<T>>
where
    Req: 'static + Send + Sync,
    Res: PayloadMessage,
    T: PayloadObject,
{
    /// A payload future for this request, using the communication evaluator.
    pub fn new_payload(request: Req, mode: PayloadMode) -> Self {
        ResponseFuture::builder(request).payload(mode).build()
    }

    /// The conversion applied on completion.
    pub fn payload_mode(&self) -> PayloadMode {
        self.core().with_data(|_, d| d.ext_mut().mode)
    }

    /// Has the network buffer backing the response been released?
    pub fn is_buffer_released(&self) -> bool {
        self.core().with_data(|_, d| d.ext_mut().buffer_released)
    }

    /// The raw payload bytes, materialized now if needed.
    /// Every call returns the same shared bytes.
    pub fn raw_payload(&self) -> Option<Arc<[u8]>> {
        self.core().with_data(|_, d| {
            let (response, slot) = d.parts_mut();
            slot.materialize(response);
            slot.raw.clone()
        })
    }

    /// The decoded payload, materialized and decoded now if needed.
    ///
    /// A decode failure fails the future if it is still pending. The error
    /// is returned either way.
    pub fn decoded_payload(&self) -> KitsuneFutureResult<Option<Arc<T>>> {
        let (res, pending) = self.core().with_data(|state, d| {
            let (response, slot) = d.parts_mut();
            slot.materialize(response);
            (slot.decode(), !state.is_terminal())
        });
        if let Err(e) = &res {
            if pending {
                self.fail_with(FailureKind::Decode, e.to_string());
            }
        }
        res
    }
}
