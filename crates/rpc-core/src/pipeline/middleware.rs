//! The interceptor chain: ordered, composable middleware wrapping every call.
//!
//! Composition is standard onion. Each interceptor receives the shared
//! [`RequestContext`] and a `next` continuation; it may run code before
//! calling `next`, short-circuit by never calling it, call it more than once
//! (the retry interceptor does exactly this), or run code after `next`
//! resolves. The outermost interceptor in registration order is the first
//! "before" and the last "after".
//!
//! `next` is re-callable rather than consumed, since a retrying interceptor
//! must be able to re-enter everything downstream of it — including the
//! transport call — once per attempt.

use std::sync::Arc;

use crate::error::RpcError;
use crate::runtime::BoxFuture;
use serde_json::Value;

use super::context::RequestContext;

/// A downstream step: takes the context and produces the eventual result.
/// Universally quantified over the context borrow so the same boxed closure
/// can be invoked with a fresh `&mut RequestContext` on every retry attempt.
pub type DynStep = dyn for<'ctx> Fn(&'ctx mut RequestContext) -> BoxFuture<'ctx, Result<Value, RpcError>>
    + Send
    + Sync;

/// The continuation an interceptor calls to proceed down the chain.
#[derive(Clone)]
pub struct Next {
    inner: Arc<DynStep>,
}

impl Next {
    pub fn call<'ctx>(&self, ctx: &'ctx mut RequestContext) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        (self.inner)(ctx)
    }
}

/// A single link in the chain. Implementations are typically stateless or
/// hold only `Arc`-shared state, since one instance handles every dispatch.
pub trait Interceptor: Send + Sync + 'static {
    fn call<'ctx>(&self, ctx: &'ctx mut RequestContext, next: Next) -> BoxFuture<'ctx, Result<Value, RpcError>>;
}

/// An ordered, immutable interceptor chain terminating in some inner effect
/// (ordinarily `transport.call`, normalized to the typed error taxonomy).
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.push(interceptor);
        self
    }

    /// Run the chain against `ctx`, terminating in `terminal` once every
    /// interceptor has called `next`. `terminal` may itself be invoked more
    /// than once if an interceptor upstream of it retries.
    pub fn run<'ctx>(
        &self,
        ctx: &'ctx mut RequestContext,
        terminal: Arc<DynStep>,
    ) -> BoxFuture<'ctx, Result<Value, RpcError>> {
        let step = build_step(&self.interceptors, 0, terminal);
        step.call(ctx)
    }
}

fn build_step(interceptors: &[Arc<dyn Interceptor>], index: usize, terminal: Arc<DynStep>) -> Next {
    match interceptors.get(index) {
        None => Next { inner: terminal },
        Some(interceptor) => {
            let interceptor = interceptor.clone();
            let interceptors = interceptors.to_vec();
            let inner: Arc<DynStep> = Arc::new(move |ctx: &mut RequestContext| {
                let next = build_step(&interceptors, index + 1, terminal.clone());
                interceptor.call(ctx, next)
            });
            Next { inner }
        }
    }
}
