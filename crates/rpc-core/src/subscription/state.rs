//! The per-subscription state cell.
//!
//! Every field the engine needs to coordinate reconnection and multi-consumer
//! bookkeeping lives in one immutable [`SubscriptionState`] snapshot, swapped
//! atomically via [`arc_swap::ArcSwap::rcu`]. A composite update (e.g.
//! "increment `pending_consumers` and read whether it moved 0→1") is always a
//! single read-modify-write against that one cell — never two separate
//! operations that could interleave with a concurrent writer.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Where a subscription sits in the lifecycle diagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Connecting,
    Active,
    Reconnecting,
    Waiting,
    Closing,
    Closed,
}

/// An immutable snapshot of a subscription's coordination state.
#[derive(Clone, Debug)]
pub struct SubscriptionState {
    pub lifecycle: Lifecycle,
    pub reconnect_attempts: u32,
    pub last_event_id: Option<String>,
    pub completed: bool,
    pub pending_consumers: u32,
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Pending,
            reconnect_attempts: 0,
            last_event_id: None,
            completed: false,
            pending_consumers: 0,
        }
    }
}

/// The atomic cell wrapping a [`SubscriptionState`] snapshot.
pub struct StateCell(ArcSwap<SubscriptionState>);

impl Default for StateCell {
    fn default() -> Self {
        Self(ArcSwap::from_pointee(SubscriptionState::default()))
    }
}

impl StateCell {
    pub fn snapshot(&self) -> Arc<SubscriptionState> {
        self.0.load_full()
    }

    pub fn transition(&self, lifecycle: Lifecycle) {
        self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.lifecycle = lifecycle;
            next
        });
    }

    /// Increment `pending_consumers`, returning the new value.
    pub fn increment_pending_consumers(&self) -> u32 {
        let updated = self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.pending_consumers += 1;
            next
        });
        updated.pending_consumers
    }

    /// Decrement `pending_consumers`, clamping at zero, returning the new
    /// value.
    pub fn decrement_pending_consumers(&self) -> u32 {
        let updated = self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.pending_consumers = next.pending_consumers.saturating_sub(1);
            next
        });
        updated.pending_consumers
    }

    /// Increment `reconnect_attempts`, returning the new value.
    pub fn bump_reconnect_attempts(&self) -> u32 {
        let updated = self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.reconnect_attempts += 1;
            next
        });
        updated.reconnect_attempts
    }

    /// Reset `reconnect_attempts` to zero, e.g. after the first event
    /// received post-reconnect.
    pub fn reset_reconnect_attempts(&self) {
        self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.reconnect_attempts = 0;
            next
        });
    }

    pub fn set_last_event_id(&self, id: Option<String>) {
        self.0.rcu(|state| {
            let mut next = (**state).clone();
            next.last_event_id = id.clone();
            next
        });
    }

    /// Mark the subscription completed, returning whether it was *already*
    /// completed before this call — callers use the "was-completed?" read to
    /// make shutdown idempotent.
    pub fn mark_completed(&self) -> bool {
        let mut was_completed = false;
        self.0.rcu(|state| {
            was_completed = state.completed;
            let mut next = (**state).clone();
            next.completed = true;
            next
        });
        was_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[test]
    fn pending_consumers_never_goes_negative() {
        let cell = StateCell::default();
        assert_eq!(cell.decrement_pending_consumers(), 0);
        assert_eq!(cell.increment_pending_consumers(), 1);
        assert_eq!(cell.decrement_pending_consumers(), 0);
    }

    #[test]
    fn mark_completed_is_idempotent_and_reports_prior_state() {
        let cell = StateCell::default();
        assert!(!cell.mark_completed());
        assert!(cell.mark_completed());
        assert!(cell.snapshot().completed);
    }

    #[tokio::test]
    async fn concurrent_increments_sum_exactly() {
        let cell = StdArc::new(StateCell::default());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let cell = cell.clone();
            handles.push(tokio::spawn(async move { cell.increment_pending_consumers() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cell.snapshot().pending_consumers, 64);
    }
}
