//! The subscription engine: turns one `transport.subscribe` event sequence
//! into a restartable, cancellable, multi-consumer broadcast with bounded
//! per-consumer buffering and exponential-backoff reconnection.
//!
//! The engine itself holds no consumer-facing API beyond
//! [`SubscriptionEngine::subscribe`]; everything a caller touches afterward —
//! attaching another consumer, reading events, cancelling — goes through the
//! returned [`Subscription`] / [`Consumer`] pair. A single background task
//! (spawned via the injected [`TaskExecutor`]) owns the transport handle and
//! is the lone producer into every attached consumer's queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{classify_transport_error, codes, RpcError};
use crate::path::validate_path;
use crate::retry::reconnect_delay;
use crate::runtime::{AsyncRuntime, TaskExecutor, TimeDriver};
use crate::transport::{Transport, TransportEvent};

use super::queue::{ConsumerQueue, QueueItem, SubscriptionEvent};
use super::state::{Lifecycle, StateCell, SubscriptionState};

/// Reconnection parameters: `{autoReconnect, maxReconnects, reconnectDelay}`.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    pub auto_reconnect: bool,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnects: 5,
            reconnect_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

/// Buffering parameters shared by every consumer attached to one
/// subscription.
#[derive(Clone, Copy, Debug)]
pub struct BroadcastConfig {
    /// Per-consumer bounded buffer capacity. Overflow evicts the oldest item.
    pub buffer_capacity: usize,
    /// When `Some(n)`, a late-joining consumer is seeded with up to the last
    /// `n` buffered events instead of starting at the live position. Default
    /// behavior (`None`) is live-only, per the engine's default semantics.
    pub replay: Option<usize>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            replay: None,
        }
    }
}

struct Inner {
    path: String,
    state: StateCell,
    consumers: DashMap<u64, Arc<ConsumerQueue>>,
    next_consumer_id: AtomicU64,
    cancel_notify: Notify,
    cancelled: std::sync::atomic::AtomicBool,
    broadcast: BroadcastConfig,
    replay_buffer: Option<tokio::sync::Mutex<std::collections::VecDeque<SubscriptionEvent>>>,
}

impl Inner {
    /// Register a new consumer and, if replay is configured, seed it with
    /// the buffered history — all under one hold of the replay lock, the
    /// same lock `broadcast_event` takes before appending a new event and
    /// fanning it out. That shared critical section is what makes replay
    /// deterministic: a `broadcast_event` call either finishes entirely
    /// before this registration starts (its event lands in the replay
    /// snapshot we read here, and this consumer is already registered by
    /// the time it fans out live) or starts entirely after (we miss it from
    /// replay, but we're already in `consumers` to receive it live). No
    /// event can be skipped by both paths at once.
    async fn register_consumer(self: &Arc<Self>) -> (u64, Arc<ConsumerQueue>) {
        let id = self.next_consumer_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(ConsumerQueue::new(self.broadcast.buffer_capacity));

        match &self.replay_buffer {
            Some(replay) => {
                let buffered = replay.lock().await;
                self.consumers.insert(id, queue.clone());
                self.state.increment_pending_consumers();
                for event in buffered.iter().cloned() {
                    queue.push(QueueItem::Event(event)).await;
                }
            }
            None => {
                self.consumers.insert(id, queue.clone());
                self.state.increment_pending_consumers();
            }
        }

        (id, queue)
    }
}

/// The producer-facing handle created by [`SubscriptionEngine::subscribe`].
/// Holds the shared coordination state; dropping it does not cancel the
/// subscription — call [`Subscription::cancel`] explicitly, or drop every
/// attached [`Consumer`] (each `Consumer::drop` decrements the pending-
/// consumer count, and the subscription cancels itself once that count
/// reaches zero).
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// The current coordination state snapshot (`lifecycle`,
    /// `reconnect_attempts`, `completed`, `pending_consumers`, ...).
    pub fn state(&self) -> Arc<SubscriptionState> {
        self.inner.state.snapshot()
    }

    /// Attach a new consumer. If the engine already completed (naturally or
    /// via error), the new consumer immediately observes the terminal
    /// sentinel rather than blocking forever. If replay is configured, the
    /// new consumer is first seeded with up to the last N buffered events,
    /// seeded and registered atomically so a concurrent live event is never
    /// duplicated or skipped (see [`Inner::register_consumer`]).
    pub async fn consumer(&self) -> Consumer {
        let (id, queue) = self.inner.register_consumer().await;

        if self.inner.state.snapshot().completed {
            queue.push(QueueItem::Shutdown).await;
        }

        Consumer {
            id,
            queue,
            inner: self.inner.clone(),
            finished: false,
        }
    }

    /// Cancel the subscription: release the transport handle, transition to
    /// `Closing`, offer exactly one shutdown sentinel per registered
    /// consumer, then `Closed`. Idempotent — a second call is a no-op.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.cancel_notify.notify_waiters();
    }
}

/// One consumer's view of a subscription: events in producer order, at most
/// one terminal outcome, idempotent cancellation.
pub struct Consumer {
    id: u64,
    queue: Arc<ConsumerQueue>,
    inner: Arc<Inner>,
    finished: bool,
}

impl Consumer {
    /// Receive the next event, or `None` once the terminal sentinel has been
    /// observed — every subsequent call also returns `None` without
    /// blocking.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        if self.finished {
            return None;
        }
        match self.queue.recv().await {
            QueueItem::Event(event) => Some(event),
            QueueItem::Shutdown => {
                self.finished = true;
                None
            }
        }
    }

    /// How many buffered events this consumer has lost to overflow eviction.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Cancel the whole subscription, not just this consumer's attachment.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.cancel_notify.notify_waiters();
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.inner.consumers.remove(&self.id);
        if self.inner.state.decrement_pending_consumers() == 0 {
            self.inner.cancelled.store(true, Ordering::SeqCst);
            self.inner.cancel_notify.notify_waiters();
        }
    }
}

/// Turns `transport.subscribe` into a restartable, multi-consumer broadcast.
pub struct SubscriptionEngine<R: AsyncRuntime> {
    transport: Arc<dyn Transport>,
    runtime: Arc<R>,
    reconnect: ReconnectConfig,
    broadcast: BroadcastConfig,
}

impl<R: AsyncRuntime> SubscriptionEngine<R> {
    pub fn new(transport: Arc<dyn Transport>, runtime: Arc<R>) -> Self {
        Self {
            transport,
            runtime,
            reconnect: ReconnectConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastConfig) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Open a subscription. Returns immediately with a `(Subscription,
    /// Consumer)` pair; the transport connection and reconnect loop run in a
    /// background task owned by the returned `Subscription`.
    pub async fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
    ) -> Result<(Subscription, Consumer), RpcError> {
        let validated = validate_path(path)?;

        let replay_buffer = self
            .broadcast
            .replay
            .map(|_| tokio::sync::Mutex::new(std::collections::VecDeque::new()));

        let inner = Arc::new(Inner {
            path: validated.as_str().to_string(),
            state: StateCell::default(),
            consumers: DashMap::new(),
            next_consumer_id: AtomicU64::new(0),
            cancel_notify: Notify::new(),
            cancelled: std::sync::atomic::AtomicBool::new(false),
            broadcast: self.broadcast,
            replay_buffer,
        });

        let (id, queue) = inner.register_consumer().await;
        let subscription = Subscription { inner: inner.clone() };
        let consumer = Consumer { id, queue, inner: inner.clone(), finished: false };

        let transport = self.transport.clone();
        let runtime = self.runtime.clone();
        let reconnect = self.reconnect;
        let input_for_task = input;

        self.runtime.spawn(Box::pin(async move {
            run_producer(inner, transport, runtime, reconnect, input_for_task).await;
        }));

        Ok((subscription, consumer))
    }
}

async fn broadcast_event(inner: &Arc<Inner>, event: SubscriptionEvent) {
    if let Some(buffer) = &inner.replay_buffer {
        let mut buffer = buffer.lock().await;
        let cap = inner.broadcast.replay.unwrap_or(0).max(1);
        if buffer.len() >= cap {
            buffer.pop_front();
        }
        buffer.push_back(event.clone());
    }
    for entry in inner.consumers.iter() {
        entry.value().push(QueueItem::Event(event.clone())).await;
    }
}

async fn finish(inner: &Arc<Inner>, outcome: Option<RpcError>) {
    let was_completed = inner.state.mark_completed();
    if was_completed {
        return;
    }
    inner.state.transition(Lifecycle::Closing);
    match outcome {
        Some(error) => broadcast_event(inner, SubscriptionEvent::Error(Arc::new(error))).await,
        None => broadcast_event(inner, SubscriptionEvent::Completed).await,
    }
    for entry in inner.consumers.iter() {
        entry.value().push(QueueItem::Shutdown).await;
    }
    inner.state.transition(Lifecycle::Closed);
}

async fn run_producer(
    inner: Arc<Inner>,
    transport: Arc<dyn Transport>,
    runtime: Arc<dyn AsyncRuntime>,
    reconnect: ReconnectConfig,
    input: Option<Value>,
) {
    inner.state.transition(Lifecycle::Connecting);

    loop {
        if inner.cancelled.load(Ordering::SeqCst) {
            finish(&inner, None).await;
            return;
        }

        // The budget gate runs *before* every subscribe past the first: a
        // reconnect attempt that would exceed `max_reconnects` never reaches
        // the transport at all, it terminates right here.
        let attempts_so_far = inner.state.snapshot().reconnect_attempts;
        if attempts_so_far > 0 && attempts_so_far >= reconnect.max_reconnects {
            warn!(path = %inner.path, attempts = attempts_so_far, max = reconnect.max_reconnects, "subscription exhausted reconnect budget");
            finish(
                &inner,
                Some(RpcError::max_reconnects_exceeded(&inner.path, attempts_so_far, reconnect.max_reconnects)),
            )
            .await;
            return;
        }

        inner.state.transition(Lifecycle::Connecting);
        let mut sequence = match transport.subscribe(&inner.path, input.clone()).await {
            Ok(sequence) => sequence,
            Err(raw) => {
                let error = classify_transport_error(&inner.path, raw);
                if let Some(terminal) = handle_failure(&inner, &reconnect, &runtime, error).await {
                    finish(&inner, terminal).await;
                    return;
                }
                continue;
            }
        };

        inner.state.transition(Lifecycle::Active);
        let mut received_since_reconnect = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = inner.cancel_notify.notified() => {
                    sequence.cancel().await;
                    finish(&inner, None).await;
                    return;
                }
                event = sequence.next() => event,
            };

            match next {
                Some(TransportEvent::Data(payload)) => {
                    if !received_since_reconnect {
                        inner.state.reset_reconnect_attempts();
                        received_since_reconnect = true;
                    }
                    broadcast_event(&inner, SubscriptionEvent::Data(payload)).await;
                }
                Some(TransportEvent::Completed) | None => {
                    sequence.cancel().await;
                    finish(&inner, None).await;
                    return;
                }
                Some(TransportEvent::Error(raw)) => {
                    let error = classify_transport_error(&inner.path, raw);
                    sequence.cancel().await;
                    if let Some(terminal) = handle_failure(&inner, &reconnect, &runtime, error).await {
                        finish(&inner, terminal).await;
                        return;
                    }
                    break;
                }
            }
        }
    }
}

/// Apply the §4.9 reconnection decision to one transport-level failure
/// (whether from `subscribe()` itself or from the active event stream).
/// Returns `Some(error)` when the engine must finish with that terminal
/// error (non-retryable, or `autoReconnect=false`), or `None` after already
/// waiting out the backoff — the producer loops back to the budget gate and
/// then `transport.subscribe` again.
async fn handle_failure(
    inner: &Arc<Inner>,
    reconnect: &ReconnectConfig,
    runtime: &Arc<dyn AsyncRuntime>,
    error: RpcError,
) -> Option<RpcError> {
    if !reconnect.auto_reconnect {
        return Some(error);
    }
    if !error.is_retryable() {
        return Some(error);
    }

    let attempts = inner.state.bump_reconnect_attempts();
    inner.state.transition(Lifecycle::Reconnecting);
    let delay = reconnect_delay(reconnect.reconnect_delay, attempts, reconnect.jitter);
    inner.state.transition(Lifecycle::Waiting);
    debug!(path = %inner.path, attempts, ?delay, "reconnecting subscription");
    runtime.sleep(delay).await;
    None
}

/// `true` if `error`'s observed code is the synthetic reconnect-budget code,
/// used by tests asserting §8 invariant 8 ("never more than one error event
/// per terminal outcome").
pub fn is_max_reconnects_exceeded(error: &RpcError) -> bool {
    error.observed_code() == codes::MAX_RECONNECTS_EXCEEDED
}
