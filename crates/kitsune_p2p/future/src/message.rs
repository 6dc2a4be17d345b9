//! The boundary between futures and the message layer.
//!
//! Encoding, decoding and addressing of messages belong to the transport.
//! Futures only need to know what kind of message a response is, and,
//! for payload futures, how to get at the buffer backing its payload.

use crate::NetBuf;

/// Message type, as carried in the message header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, serde::Serialize, serde::Deserialize,
)]
pub enum MessageType {
    /// Request expecting a reply.
    Request1,
    /// Request expecting a reply.
    Request2,
    /// Request expecting a reply.
    Request3,
    /// Request expecting a reply.
    Request4,
    /// Fire and forget request.
    RequestFf1,
    /// Fire and forget request.
    RequestFf2,
    /// The request was processed.
    Ok,
    /// The request was partially processed.
    PartiallyOk,
    /// The remote has nothing for this request.
    NotFound,
    /// The remote refused the request.
    Denied,
    /// The remote does not know the addressed id.
    UnknownId,
    /// The remote failed while processing.
    Exception,
    /// The remote cancelled the request.
    Cancel,
    /// Application defined.
    User1,
}

impl MessageType {
    /// Is this a request, rather than a reply?
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::Request1
                | Self::Request2
                | Self::Request3
                | Self::Request4
                | Self::RequestFf1
                | Self::RequestFf2
        )
    }

    /// Affirmative reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok | Self::PartiallyOk)
    }

    /// Negative reply, i.e. the remote processed the request and said no.
    pub fn is_not_ok(&self) -> bool {
        matches!(self, Self::NotFound | Self::Denied)
    }
}

/// A request or response as seen by a future.
pub trait Message: 'static + Send + Sync {
    /// The header type of this message.
    fn message_type(&self) -> MessageType;

    /// Human readable type description, used as the completion reason.
    fn describe(&self) -> String {
        self.message_type().to_string()
    }
}

/// A response whose payload lives in a pooled network buffer.
pub trait PayloadMessage: Message {
    /// The buffer type the transport hands us.
    type Buf: NetBuf;

    /// Move the payload buffer out of the message.
    /// Returns `None` if there is no payload, or it was already taken.
    fn take_payload(&mut self) -> Option<Self::Buf>;
}
