//! The six standard, optional interceptors.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dedup::{dedup_key, DedupCache};
use crate::error::RpcError;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::runtime::{BoxFuture, TimeDriver};

use super::context::RequestContext;
use super::middleware::{Interceptor, Next};

/// `→ path input` before, `← path result duration` after, error on failure.
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            debug!(path = %ctx.path, input = ?ctx.input, "→ dispatch");
            let started = Instant::now();
            let path = ctx.path.clone();
            let result = next.call(ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(value) => debug!(%path, ?value, elapsed_ms, "← dispatch"),
                Err(error) => warn!(%path, %error, elapsed_ms, "dispatch failed"),
            }
            result
        })
    }
}

/// Wraps `next` in a retry schedule gated by the policy's `retry_on`
/// predicate (default: the retryability table). Each retry attempt calls
/// `next` again, re-entering every interceptor and the transport downstream
/// of this one.
pub struct RetryInterceptor<R: TimeDriver> {
    policy: RetryPolicy,
    time: Arc<R>,
}

impl<R: TimeDriver> RetryInterceptor<R> {
    pub fn new(policy: RetryPolicy, time: Arc<R>) -> Self {
        Self { policy, time }
    }
}

impl<R: TimeDriver> Interceptor for RetryInterceptor<R> {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            run_with_retry(&self.policy, self.time.as_ref(), move |_attempt| next.call(&mut *ctx)).await
        })
    }
}

/// Awaits `get_token()`, sets `meta[header_name] = "{prefix} {token}"` when
/// the token is non-empty; no header when absent/empty.
pub struct AuthInterceptor {
    pub header_name: String,
    pub prefix: String,
    pub get_token: Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>,
}

impl Interceptor for AuthInterceptor {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            if let Some(token) = (self.get_token)().await {
                if !token.is_empty() {
                    ctx.meta.insert(
                        self.header_name.clone(),
                        Value::String(format!("{} {}", self.prefix, token)),
                    );
                }
            }
            next.call(ctx).await
        })
    }
}

/// Captures elapsed milliseconds and invokes `on_timing(path, ms)` on both
/// success and failure.
pub struct TimingInterceptor {
    pub on_timing: Arc<dyn Fn(&str, u64) + Send + Sync>,
}

impl Interceptor for TimingInterceptor {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            let started = Instant::now();
            let path = ctx.path.clone();
            let result = next.call(ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            (self.on_timing)(&path, elapsed_ms);
            result
        })
    }
}

/// Deduplicates concurrent calls sharing a key derived from `ctx.path` and
/// `ctx.input` (or a custom key function).
pub struct DedupeInterceptor {
    pub cache: Arc<DedupCache>,
    pub key_fn: Option<Arc<dyn Fn(&RequestContext) -> String + Send + Sync>>,
}

impl Interceptor for DedupeInterceptor {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            let key = match &self.key_fn {
                Some(f) => f(ctx),
                None => dedup_key(&ctx.path, ctx.input.as_ref()),
            };
            self.cache
                .run(&key, || next.call(ctx))
                .await
                .map(|arc| (*arc).clone())
        })
    }
}

/// Invokes `handler(err, ctx)` on failure and re-throws — the error kind is
/// always preserved; the handler is for side effects (logging, metrics).
pub struct ErrorHandlerInterceptor {
    pub handler: Arc<dyn Fn(&RpcError, &RequestContext) + Send + Sync>,
}

impl Interceptor for ErrorHandlerInterceptor {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        Box::pin(async move {
            let result = next.call(ctx).await;
            if let Err(error) = &result {
                (self.handler)(error, ctx);
            }
            result
        })
    }
}
