//! The subscription engine: restartable, cancellable, multi-consumer event
//! sequences with bounded buffering and reconnection. See §4.9 of the
//! runtime specification for the lifecycle state machine this implements.

mod engine;
mod queue;
mod state;

pub use engine::{is_max_reconnects_exceeded, BroadcastConfig, Consumer, ReconnectConfig, Subscription, SubscriptionEngine};
pub use queue::SubscriptionEvent;
pub use state::{Lifecycle, SubscriptionState};
