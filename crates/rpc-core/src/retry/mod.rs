//! Backoff combinators and the retry schedule built on top of them.

mod backoff;
mod schedule;

pub use backoff::{reconnect_delay, BackoffKind, BackoffPolicy};
pub use schedule::{run_with_retry, RetryPolicy};
