//! Batch dispatch: native single-round-trip batching, or fan-out strategies
//! bounded by a concurrency cap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use crate::error::{classify_transport_error, RpcError};
use crate::path::validate_path;
use crate::transport::{BatchRequestItem, BatchResultItem, Transport};

/// One logical item of a batch, before dispatch.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub id: String,
    pub path: String,
    pub input: Option<Value>,
}

/// The outcome of one batch item: success or a typed error, never both.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub id: String,
    pub result: Result<Value, RpcError>,
}

/// Single transport round-trip. Validates every path before sending;
/// aborts without dispatching on the first invalid path.
pub async fn native_batch(
    transport: &dyn Transport,
    items: Vec<BatchItem>,
) -> Result<Vec<BatchOutcome>, RpcError> {
    for item in &items {
        validate_path(&item.path)?;
    }

    let requests: Vec<BatchRequestItem> = items
        .iter()
        .map(|item| BatchRequestItem {
            id: item.id.clone(),
            path: item.path.clone(),
            input: item.input.clone(),
        })
        .collect();

    match transport.call_batch(requests).await {
        None => Err(RpcError::call(
            "UNKNOWN",
            "transport does not support native batching",
        )),
        Some(Err(raw)) => Err(classify_transport_error("batch", raw)),
        Some(Ok(results)) => Ok(results
            .into_iter()
            .map(|BatchResultItem { id, data, error }| {
                let result = match (data, error) {
                    (Some(data), _) => Ok(data),
                    (None, Some(raw)) => Err(classify_transport_error(&id, raw)),
                    (None, None) => Err(RpcError::call("UNKNOWN", "batch item had neither data nor error")),
                };
                BatchOutcome { id, result }
            })
            .collect()),
    }
}

/// Every item dispatched concurrently, bounded by `concurrency`. Always
/// returns a result for every item — per-item failure never fails the whole
/// batch.
pub async fn parallel_collect(
    transport: Arc<dyn Transport>,
    items: Vec<BatchItem>,
    concurrency: usize,
    in_flight: Option<Arc<AtomicUsize>>,
) -> Vec<BatchOutcome> {
    let concurrency = concurrency.max(1);
    let mut pending = items.into_iter();
    let mut futures = FuturesUnordered::new();
    let mut results = Vec::new();

    for item in pending.by_ref().take(concurrency) {
        futures.push(dispatch_one(transport.clone(), item, in_flight.clone()));
    }

    while let Some(outcome) = futures.next().await {
        results.push(outcome);
        if let Some(item) = pending.next() {
            futures.push(dispatch_one(transport.clone(), item, in_flight.clone()));
        }
    }

    results
}

/// Every item dispatched concurrently, bounded by `concurrency`. The first
/// failure cancels the remaining work (by simply not awaiting it further)
/// and surfaces that error; already-completed successes are discarded.
pub async fn parallel_fail_fast(
    transport: Arc<dyn Transport>,
    items: Vec<BatchItem>,
    concurrency: usize,
    in_flight: Option<Arc<AtomicUsize>>,
) -> Result<Vec<BatchOutcome>, RpcError> {
    let concurrency = concurrency.max(1);
    let mut pending = items.into_iter();
    let mut futures = FuturesUnordered::new();
    let mut results = Vec::new();

    for item in pending.by_ref().take(concurrency) {
        futures.push(dispatch_one(transport.clone(), item, in_flight.clone()));
    }

    while let Some(outcome) = futures.next().await {
        if let Err(error) = &outcome.result {
            return Err(clone_error(error));
        }
        results.push(outcome);
        if let Some(item) = pending.next() {
            futures.push(dispatch_one(transport.clone(), item, in_flight.clone()));
        }
    }

    Ok(results)
}

/// Strictly one item at a time, preserving input order — needed when later
/// items depend on the observable side effects of earlier ones.
pub async fn sequential(transport: &dyn Transport, items: Vec<BatchItem>) -> Vec<BatchOutcome> {
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        results.push(dispatch_one_ref(transport, item).await);
    }
    results
}

async fn dispatch_one(transport: Arc<dyn Transport>, item: BatchItem, in_flight: Option<Arc<AtomicUsize>>) -> BatchOutcome {
    if let Some(counter) = &in_flight {
        counter.fetch_add(1, Ordering::SeqCst);
    }
    let outcome = dispatch_one_ref(transport.as_ref(), item).await;
    if let Some(counter) = &in_flight {
        counter.fetch_sub(1, Ordering::SeqCst);
    }
    outcome
}

async fn dispatch_one_ref(transport: &dyn Transport, item: BatchItem) -> BatchOutcome {
    let result = match validate_path(&item.path) {
        Ok(validated) => transport
            .call(validated.as_str(), item.input)
            .await
            .map_err(|raw| classify_transport_error(validated.as_str(), raw)),
        Err(error) => Err(error),
    };
    BatchOutcome { id: item.id, result }
}

fn clone_error(error: &RpcError) -> RpcError {
    RpcError::from_shape(error.path().unwrap_or_default(), error.to_shape())
}
