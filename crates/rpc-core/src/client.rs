//! The low-level client: one [`Transport`] plus one [`AsyncRuntime`], wired
//! through the interceptor chain, batch strategies, and the subscription
//! engine. This is the object a contract-tree path proxy (`rpc-client`)
//! dispatches through; it carries no knowledge of procedure *names*, only of
//! `(path, input, kind)`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::dedup::DedupCache;
use crate::dispatch::{self, BatchItem, BatchOutcome, DispatchHooks};
use crate::error::RpcError;
use crate::pipeline::{DedupeInterceptor, InterceptorChain, ProcedureKind};
use crate::runtime::AsyncRuntime;
use crate::subscription::{BroadcastConfig, Consumer, ReconnectConfig, Subscription, SubscriptionEngine};
use crate::transport::Transport;

/// How a [`Client::call_batch`] should execute its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStrategy {
    /// A single `transport.call_batch` round-trip.
    Native,
    /// Fan out concurrently, collecting a result per item regardless of
    /// individual failures.
    ParallelCollect,
    /// Fan out concurrently; the first failure cancels the rest and
    /// surfaces immediately.
    ParallelFailFast,
    /// Strictly one item at a time, in order.
    Sequential,
}

/// Recognized client-level configuration (§6).
#[derive(Clone)]
pub struct ClientConfig {
    pub timeout: Option<Duration>,
    pub interceptors: InterceptorChain,
    pub hooks: DispatchHooks,
    pub reconnect: ReconnectConfig,
    pub broadcast: BroadcastConfig,
    pub batch_concurrency: usize,
    /// A process-wide or client-scoped dedup cache. `None` disables the
    /// built-in dedup interceptor convenience wiring (callers can still
    /// install `DedupeInterceptor` directly in `interceptors`).
    pub dedupe: Option<Arc<DedupCache>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            interceptors: InterceptorChain::new(),
            hooks: DispatchHooks::default(),
            reconnect: ReconnectConfig::default(),
            broadcast: BroadcastConfig::default(),
            batch_concurrency: 5,
            dedupe: None,
        }
    }
}

/// A transport-agnostic RPC client: the runtime core's single entry point for
/// query/mutation dispatch, batch dispatch, and subscriptions.
pub struct Client<R: AsyncRuntime> {
    transport: Arc<dyn Transport>,
    runtime: Arc<R>,
    config: ClientConfig,
    /// `config.interceptors` plus an auto-installed dedup interceptor when
    /// `config.dedupe` is set — kept separate so `config` can still be
    /// inspected/cloned verbatim by callers.
    interceptors: InterceptorChain,
    subscriptions: SubscriptionEngine<R>,
}

impl<R: AsyncRuntime> Client<R> {
    pub fn new(transport: Arc<dyn Transport>, runtime: Arc<R>, config: ClientConfig) -> Self {
        let subscriptions = SubscriptionEngine::new(transport.clone(), runtime.clone())
            .with_reconnect(config.reconnect)
            .with_broadcast(config.broadcast);

        let mut interceptors = config.interceptors.clone();
        if let Some(cache) = &config.dedupe {
            interceptors.push(Arc::new(DedupeInterceptor {
                cache: cache.clone(),
                key_fn: None,
            }));
        }

        Self {
            transport,
            runtime,
            config,
            interceptors,
            subscriptions,
        }
    }

    /// Dispatch one query or mutation through the interceptor chain.
    pub async fn call(&self, path: &str, input: Option<Value>, kind: ProcedureKind) -> Result<Value, RpcError> {
        dispatch::dispatch_call(
            self.transport.clone(),
            &self.interceptors,
            &self.config.hooks,
            self.runtime.as_ref(),
            path,
            input,
            kind,
            self.config.timeout,
        )
        .await
    }

    /// Dispatch a batch of logical calls under the configured strategy.
    pub async fn call_batch(&self, items: Vec<BatchItem>, strategy: BatchStrategy) -> BatchOutcomeSet {
        match strategy {
            BatchStrategy::Native => match dispatch::native_batch(self.transport.as_ref(), items).await {
                Ok(outcomes) => BatchOutcomeSet::Collected(outcomes),
                Err(error) => BatchOutcomeSet::Failed(error),
            },
            BatchStrategy::ParallelCollect => {
                let outcomes =
                    dispatch::parallel_collect(self.transport.clone(), items, self.config.batch_concurrency, None)
                        .await;
                BatchOutcomeSet::Collected(outcomes)
            }
            BatchStrategy::ParallelFailFast => {
                match dispatch::parallel_fail_fast(self.transport.clone(), items, self.config.batch_concurrency, None)
                    .await
                {
                    Ok(outcomes) => BatchOutcomeSet::Collected(outcomes),
                    Err(error) => BatchOutcomeSet::Failed(error),
                }
            }
            BatchStrategy::Sequential => {
                let outcomes = dispatch::sequential(self.transport.as_ref(), items).await;
                BatchOutcomeSet::Collected(outcomes)
            }
        }
    }

    /// Open a subscription, returning the shared handle and its first
    /// attached consumer.
    pub async fn subscribe(&self, path: &str, input: Option<Value>) -> Result<(Subscription, Consumer), RpcError> {
        self.subscriptions.subscribe(path, input).await
    }
}

/// The result of [`Client::call_batch`]: either a per-item outcome vector, or
/// a whole-batch failure (native batching rejected up front, or fail-fast's
/// first error).
#[derive(Debug)]
pub enum BatchOutcomeSet {
    Collected(Vec<BatchOutcome>),
    Failed(RpcError),
}
