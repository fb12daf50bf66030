//! The concrete [`AsyncRuntime`](rpc_core::runtime::AsyncRuntime) the core
//! crate's dispatch and subscription layers suspend through.

use std::time::Duration;

use rpc_core::runtime::{BoxFuture, TaskExecutor, TimeDriver};

/// Zero-sized handle binding `rpc-core`'s runtime seam to a live Tokio
/// runtime. `Clone`-free and `Copy` since there is no per-instance state —
/// `tokio::spawn`/`tokio::time::sleep` reach the ambient runtime via a
/// thread-local, not through `self`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioRuntime;

impl TimeDriver for TokioRuntime {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

impl TaskExecutor for TokioRuntime {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn sleep_resolves_after_roughly_the_requested_duration() {
        let started = std::time::Instant::now();
        TokioRuntime.sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn spawn_runs_the_future() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        TokioRuntime.spawn(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
