//! Test doubles for the message and buffer boundaries.

use crate::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts releases across every [`CountingBuf`] sharing it.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    /// Releases seen so far.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts drops across every [`DropToken`] it handed out.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    /// A new token reporting to this counter when dropped.
    pub fn token(&self) -> DropToken {
        DropToken(self.0.clone())
    }

    /// Drops seen so far.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Increments its [`DropCounter`] when dropped.
#[derive(Debug)]
pub struct DropToken(Arc<AtomicUsize>);

impl Drop for DropToken {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`NetBuf`] that records how many times it was released.
#[derive(Debug, Clone)]
pub struct CountingBuf {
    bytes: Vec<u8>,
    releases: ReleaseCounter,
}

impl CountingBuf {
    /// A buffer holding `bytes`, reporting releases to `releases`.
    pub fn new(bytes: Vec<u8>, releases: &ReleaseCounter) -> Self {
        Self {
            bytes,
            releases: releases.clone(),
        }
    }
}

impl NetBuf for CountingBuf {
    fn readable(&self) -> &[u8] {
        &self.bytes
    }

    fn release(self) {
        self.releases.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A minimal message: a type header and an optional payload buffer.
#[derive(Debug, Clone)]
pub struct TestMessage {
    message_type: MessageType,
    payload: Option<CountingBuf>,
}

impl TestMessage {
    /// A message of the given type without payload.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            payload: None,
        }
    }

    /// A plain request.
    pub fn request() -> Self {
        Self::new(MessageType::Request1)
    }

    /// A message of the given type carrying a payload buffer.
    pub fn with_payload(message_type: MessageType, payload: CountingBuf) -> Self {
        Self {
            message_type,
            payload: Some(payload),
        }
    }
}

impl Message for TestMessage {
    fn message_type(&self) -> MessageType {
        self.message_type
    }
}

impl PayloadMessage for TestMessage {
    type Buf = CountingBuf;

    fn take_payload(&mut self) -> Option<Self::Buf> {
        self.payload.take()
    }
}

/// A message whose payload lives in a real [`BufPool`].
#[derive(Debug)]
pub struct PooledMessage {
    message_type: MessageType,
    payload: Option<PoolBuf>,
}

impl PooledMessage {
    /// Copy `bytes` into a buffer from `pool`.
    pub fn new(message_type: MessageType, pool: &BufPool, bytes: &[u8]) -> Self {
        Self {
            message_type,
            payload: Some(pool.acquire_from(bytes)),
        }
    }
}

impl Message for PooledMessage {
    fn message_type(&self) -> MessageType {
        self.message_type
    }
}

impl PayloadMessage for PooledMessage {
    type Buf = PoolBuf;

    fn take_payload(&mut self) -> Option<Self::Buf> {
        self.payload.take()
    }
}
