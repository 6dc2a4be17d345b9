#![deny(missing_docs)]
#![deny(unsafe_code)]
//! Kitsune P2p Futures
//!
//! Every request a kitsune node sends, every bootstrap handshake and every
//! deferred remote reply is tracked by a future from this crate. A future
//! starts out [`FutureState::Pending`] and transitions to exactly one terminal
//! state, exactly once, no matter how many threads race to complete or cancel
//! it. Observers either register listeners (called in registration order,
//! outside the future's lock) or block in
//! [`KitsuneFuture::await_completion`].
//!
//! These are not `std::future::Future`s. They are shared, thread-safe
//! completion handles; use [`KitsuneFuture::wait`] to get something `.await`able.
//!
//! - [`ResponseFuture`] binds a future to an outgoing request and evaluates
//!   the incoming response with a pluggable [`SuccessEvaluator`].
//! - [`PayloadFuture`] additionally materializes the response payload out of
//!   a pooled network buffer, releasing that buffer exactly once.
//! - [`WrapperFuture`] mirrors an inner future while carrying extra data,
//!   [`ForkJoinFuture`] and [`LateJoinFuture`] aggregate many futures.

/// Re-exported dependencies.
pub mod dependencies {
    pub use ::futures;
    pub use ::parking_lot;
    pub use ::thiserror;
    pub use ::tokio;
    pub use ::tracing;
}

mod base;
mod buf;
mod cancel;
pub mod config;
mod done;
mod error;
mod evaluator;
mod join;
mod message;
mod payload;
mod response;
mod state;
mod timeout;
pub mod trace;
mod wrapper;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use base::*;
pub use buf::*;
pub use cancel::*;
pub use config::{KitsuneFutureTuning, KitsuneFutureTuningParams};
pub use done::*;
pub use error::*;
pub use evaluator::*;
pub use join::*;
pub use message::*;
pub use payload::*;
pub use response::*;
pub use state::*;
pub use timeout::*;
pub use wrapper::*;
