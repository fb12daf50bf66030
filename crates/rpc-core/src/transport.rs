//! The injected transport contract: `call`, `call_batch`, `subscribe`.
//!
//! `rpc-core` never talks to a socket or pipe directly. Everything it knows
//! about the outside world comes through a single `Arc<dyn Transport>`,
//! mirroring the object-safe transport traits in the runtime crate this one
//! is modeled on — `async_trait` boxes the futures so the trait stays
//! dyn-compatible.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RawTransportError;
use crate::sealed::Sealed;

/// One item of a native batch response.
#[derive(Clone, Debug)]
pub struct BatchResultItem {
    pub id: String,
    pub data: Option<Value>,
    pub error: Option<RawTransportError>,
}

/// A single outgoing batch request item.
#[derive(Clone, Debug)]
pub struct BatchRequestItem {
    pub id: String,
    pub path: String,
    pub input: Option<Value>,
}

/// An event pulled from a subscription's underlying sequence.
#[derive(Debug)]
pub enum TransportEvent {
    Data(Value),
    Error(RawTransportError),
    Completed,
}

/// A live, cancellable event sequence produced by `subscribe`.
///
/// Object-safe by construction: `next` and `cancel` are the only operations
/// the subscription engine needs, both expressed as boxed futures rather
/// than an associated `Stream` type, so a `Box<dyn EventSequence>` can be
/// stored uniformly regardless of the concrete transport.
#[async_trait]
pub trait EventSequence: Send {
    /// Pull the next event, or `None` once the sequence is exhausted.
    async fn next(&mut self) -> Option<TransportEvent>;

    /// Release host-side resources. Must be idempotent and must not block
    /// beyond releasing the handle.
    async fn cancel(&mut self);
}

/// The injected transport. Implementations live outside this crate; this
/// trait is the entire surface the dispatch and subscription layers depend
/// on.
#[async_trait]
pub trait Transport: Send + Sync + Sealed {
    /// Single unary call.
    ///
    /// `rpc-core`'s dispatch layer races this future against a timeout and
    /// drops it outright if the timeout wins. A well-behaved implementation
    /// treats that drop as a cancellation: release whatever correlation
    /// state it registered for the call and, where the wire protocol
    /// supports it, tell the peer to stop producing a response — the same
    /// contract `EventSequence::cancel` makes explicit for subscriptions.
    async fn call(&self, path: &str, input: Option<Value>) -> Result<Value, RawTransportError>;

    /// Optional native batch round-trip. A transport that doesn't support
    /// native batching can return `None` and batch dispatch falls back to a
    /// parallel or sequential strategy.
    async fn call_batch(
        &self,
        requests: Vec<BatchRequestItem>,
    ) -> Option<Result<Vec<BatchResultItem>, RawTransportError>>;

    /// Open an event sequence for a subscription path.
    async fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
    ) -> Result<Box<dyn EventSequence>, RawTransportError>;
}
