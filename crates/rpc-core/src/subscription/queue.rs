//! A per-consumer bounded FIFO queue with drop-oldest overflow.
//!
//! Each consumer attached to a subscription owns one [`ConsumerQueue`]. The
//! engine is the single producer; the consumer is the single reader. Overflow
//! evicts the oldest buffered item rather than blocking the producer or
//! rejecting the push — a slow consumer falls behind, it never stalls the
//! engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::error::RpcError;

/// One domain event observed by a subscription consumer.
#[derive(Clone, Debug)]
pub enum SubscriptionEvent {
    Data(serde_json::Value),
    Error(std::sync::Arc<RpcError>),
    Completed,
}

/// One slot in the queue: either a domain event or the distinguished
/// shutdown sentinel. The sentinel is never confused with a domain payload —
/// it is its own enum variant, not an in-band value.
#[derive(Clone, Debug)]
pub enum QueueItem {
    Event(SubscriptionEvent),
    Shutdown,
}

/// The bounded, single-producer/single-consumer queue behind one attached
/// consumer.
pub struct ConsumerQueue {
    capacity: usize,
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl ConsumerQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push one item, evicting the oldest buffered item if at capacity.
    pub async fn push(&self, item: QueueItem) {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_waiters();
    }

    /// Pull the next item, waiting if the queue is empty.
    pub async fn recv(&self) -> QueueItem {
        loop {
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return item;
                }
            }
            notified.await;
        }
    }

    /// How many buffered items this consumer has lost to overflow eviction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
