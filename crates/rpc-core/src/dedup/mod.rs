//! In-flight request deduplication.
//!
//! Concurrent callers sharing a dedup key observe the same settlement
//! (success or failure) of a single underlying call; the key is removed as
//! soon as that call settles, so a dedup cache never becomes a result cache.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::canonical::canonical;
use crate::error::RpcError;
use serde_json::Value;

/// `path ⊕ "|" ⊕ canonical(input)`.
pub fn dedup_key(path: &str, input: Option<&Value>) -> String {
    format!("{path}|{}", canonical(input))
}

#[derive(Clone)]
enum Settlement {
    Ok(Arc<Value>),
    Err(Arc<RpcError>),
}

/// An in-flight entry: the first caller installs a broadcast sender and
/// drives the effect; later callers with the same key subscribe to the same
/// channel and wait for its settlement.
struct InFlight {
    sender: broadcast::Sender<Settlement>,
}

/// A deduplication cache. Construct one per client for scoped dedup, or share
/// a single [`DedupCache`] process-wide for global dedup — the two modes
/// never share state because each is just an independently owned map.
#[derive(Default)]
pub struct DedupCache {
    entries: DashMap<String, InFlight>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every in-flight entry. Callers already attached to a settling
    /// effect are unaffected — their broadcast channel keeps delivering.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove a single key's in-flight entry, if present.
    pub fn clear_key(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Run `effect` deduplicated on `key`: if another caller is already
    /// in-flight for this key, attach to its result instead of invoking
    /// `effect` again.
    pub async fn run<F, Fut>(&self, key: &str, effect: F) -> Result<Arc<Value>, RpcError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, RpcError>>,
    {
        let mut receiver = match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => occupied.get().sender.subscribe(),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = broadcast::channel(1);
                vacant.insert(InFlight { sender: sender.clone() });
                drop(receiver);

                let outcome = effect().await;
                self.entries.remove(key);

                let settlement = match &outcome {
                    Ok(value) => Settlement::Ok(Arc::new(value.clone())),
                    Err(error) => Settlement::Err(Arc::new(clone_error(error))),
                };
                let _ = sender.send(settlement);

                return outcome.map(Arc::new);
            }
        };

        match receiver.recv().await {
            Ok(Settlement::Ok(value)) => Ok(value),
            Ok(Settlement::Err(error)) => Err(clone_error(&error)),
            Err(_) => Err(RpcError::call(
                "UNKNOWN",
                "dedup in-flight entry was dropped without settling",
            )),
        }
    }
}

fn clone_error(error: &RpcError) -> RpcError {
    RpcError::from_shape(error.path().unwrap_or_default(), error.to_shape())
}
