//! The call dispatch pipeline and batch dispatch strategies.

mod batch;
mod call;

pub use batch::{native_batch, parallel_collect, parallel_fail_fast, sequential, BatchItem, BatchOutcome};
pub use call::{classify, dispatch_call, DispatchHooks};
