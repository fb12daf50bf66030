//! The async-runtime injection seam.
//!
//! `rpc-core` never names a concrete executor. Every place suspension is
//! needed (sleeping for backoff/timeout, spawning the subscription's
//! reconnect loop) goes through [`TimeDriver`] / [`TaskExecutor`], both
//! object-safe so a single `Arc<dyn AsyncRuntime>` can be threaded through
//! the client without infecting every type with a generic executor
//! parameter. Concrete runtimes (e.g. `rpc-runtime-tokio`) live in their own
//! crates.

use std::{future::Future, pin::Pin, time::Duration};

use crate::sealed::Sealed;

/// A boxed, `Send` future — the runtime-agnostic return type for every async
/// seam in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Time-keeping seam: sleeping and reading a monotonic instant.
pub trait TimeDriver: Send + Sync + 'static + Sealed {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

/// Task-spawning seam: fire-and-forget background work (the subscription
/// engine's reconnect loop runs as a spawned task so `subscribe()` can
/// return immediately with a consumer handle).
pub trait TaskExecutor: Send + Sync + 'static + Sealed {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// The combined seam handed to a [`Client`](crate::dispatch::Client) or
/// [`SubscriptionEngine`](crate::subscription::SubscriptionEngine).
pub trait AsyncRuntime: TaskExecutor + TimeDriver + Send + Sync + 'static + Sealed {}

impl<T> AsyncRuntime for T where T: TaskExecutor + TimeDriver + Send + Sync + 'static {}
