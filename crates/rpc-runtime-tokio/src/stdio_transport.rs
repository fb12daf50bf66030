//! A newline-delimited-JSON [`Transport`] over any `AsyncRead`/`AsyncWrite`
//! pair — the host process's stdin/stdout, a Unix socket, a named pipe.
//!
//! Wire framing (one JSON object per line):
//! - outgoing `{"id", "type": "call"|"callBatch"|"subscribe"|"cancel", ...}`
//! - incoming `{"id", "kind": "response"|"error"|"batchResponse"|"batchError"|"event"|"eventError"|"eventCompleted", ...}`
//!
//! A single background task owns the read half and demultiplexes incoming
//! frames by `id` to whichever call is waiting (a one-shot channel) or
//! whichever subscription is live (a bounded mpsc channel). The write half is
//! shared behind a mutex since every caller writes one line at a time.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{trace, warn};

use rpc_core::error::{ErrorShape, RawTransportError};
use rpc_core::transport::{BatchRequestItem, BatchResultItem, EventSequence, Transport, TransportEvent};

/// Failures constructing or writing to a [`StdioTransport`] that don't fit
/// the RPC error taxonomy (that classification happens one layer up, inside
/// `rpc-core`) — these are transport-construction/IO failures proper.
#[derive(Debug, Error)]
pub enum StdioTransportError {
    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

enum PendingResponse {
    Unary(Result<Value, ErrorShape>),
    Batch(Result<Vec<BatchResultItem>, ErrorShape>),
}

type Writer = Mutex<Pin<Box<dyn AsyncWrite + Send>>>;

/// Removes a unary/batch call's pending-map entry and sends a `"cancel"`
/// frame if it is still there when this guard drops — the same thing
/// `StdioEventSequence::cancel` does explicitly for subscriptions, but
/// triggered here by the caller's future being dropped (e.g. the dispatch
/// timeout race in `rpc-core` abandoning the call) rather than an explicit
/// call. If the entry is already gone — the response arrived and
/// `dispatch_incoming` already removed it — this is a no-op.
struct PendingCallGuard {
    id: u64,
    pending_calls: Arc<DashMap<u64, oneshot::Sender<PendingResponse>>>,
    writer: Arc<Writer>,
}

impl Drop for PendingCallGuard {
    fn drop(&mut self) {
        if self.pending_calls.remove(&self.id).is_none() {
            return;
        }
        let id = self.id;
        let writer = self.writer.clone();
        tokio::spawn(async move {
            let frame = json!({ "id": id, "type": "cancel" });
            let _ = write_frame_to(&writer, &frame).await;
        });
    }
}

pub struct StdioTransport {
    writer: Arc<Writer>,
    next_id: AtomicU64,
    pending_calls: Arc<DashMap<u64, oneshot::Sender<PendingResponse>>>,
    pending_subs: Arc<DashMap<u64, mpsc::Sender<TransportEvent>>>,
}

impl StdioTransport {
    /// Spawn the reader task over `reader` and wrap `writer` for outgoing
    /// frames. Both halves must outlive every in-flight call/subscription.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending_calls = Arc::new(DashMap::new());
        let pending_subs = Arc::new(DashMap::new());

        tokio::spawn(read_loop(reader, pending_calls.clone(), pending_subs.clone()));

        Self {
            writer: Arc::new(Mutex::new(Box::pin(writer))),
            next_id: AtomicU64::new(1),
            pending_calls,
            pending_subs,
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_frame(&self, frame: &Value) -> Result<(), StdioTransportError> {
        write_frame_to(&self.writer, frame).await
    }
}

async fn write_frame_to(writer: &Writer, frame: &Value) -> Result<(), StdioTransportError> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    let mut guard = writer.lock().await;
    guard.write_all(&line).await?;
    guard.flush().await?;
    Ok(())
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: R,
    pending_calls: Arc<DashMap<u64, oneshot::Sender<PendingResponse>>>,
    pending_subs: Arc<DashMap<u64, mpsc::Sender<TransportEvent>>>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                trace!("stdio transport reader reached end of stream");
                break;
            }
            Err(error) => {
                warn!(%error, "stdio transport reader failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "stdio transport received malformed frame");
                continue;
            }
        };
        dispatch_incoming(value, &pending_calls, &pending_subs);
    }

    // The peer is gone: dropping every pending oneshot sender resolves each
    // waiting `call`/`call_batch` with `RecvError`, and dropping every
    // subscription sender closes its mpsc channel so `next()` returns `None`
    // instead of hanging.
    pending_calls.clear();
    pending_subs.clear();
}

fn dispatch_incoming(
    value: Value,
    pending_calls: &DashMap<u64, oneshot::Sender<PendingResponse>>,
    pending_subs: &DashMap<u64, mpsc::Sender<TransportEvent>>,
) {
    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        warn!("stdio transport frame missing integer id");
        return;
    };
    let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();

    match kind {
        "response" => {
            if let Some((_, sender)) = pending_calls.remove(&id) {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                let _ = sender.send(PendingResponse::Unary(Ok(data)));
            }
        }
        "error" => {
            if let Some((_, sender)) = pending_calls.remove(&id) {
                let _ = sender.send(PendingResponse::Unary(Err(parse_error_shape(&value))));
            }
        }
        "batchResponse" => {
            if let Some((_, sender)) = pending_calls.remove(&id) {
                let results = value
                    .get("results")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(parse_batch_result_item).collect())
                    .unwrap_or_default();
                let _ = sender.send(PendingResponse::Batch(Ok(results)));
            }
        }
        "batchError" => {
            if let Some((_, sender)) = pending_calls.remove(&id) {
                let _ = sender.send(PendingResponse::Batch(Err(parse_error_shape(&value))));
            }
        }
        "event" => {
            if let Some(sender) = pending_subs.get(&id) {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                let _ = sender.try_send(TransportEvent::Data(data));
            }
        }
        "eventError" => {
            if let Some((_, sender)) = pending_subs.remove(&id) {
                let _ = sender.try_send(TransportEvent::Error(RawTransportError::Shaped(parse_error_shape(&value))));
            }
        }
        "eventCompleted" => {
            if let Some((_, sender)) = pending_subs.remove(&id) {
                let _ = sender.try_send(TransportEvent::Completed);
            }
        }
        other => warn!(kind = other, "stdio transport received frame of unknown kind"),
    }
}

fn parse_error_shape(value: &Value) -> ErrorShape {
    let error = value.get("error").cloned().unwrap_or(Value::Null);
    ErrorShape {
        code: error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string(),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        details: error.get("details").cloned(),
    }
}

fn parse_batch_result_item(value: &Value) -> BatchResultItem {
    let id = value.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let data = value.get("data").cloned();
    let error = value.get("error").map(|_| RawTransportError::Shaped(parse_error_shape(value)));
    BatchResultItem { id, data, error }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, path: &str, input: Option<Value>) -> Result<Value, RawTransportError> {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending_calls.insert(id, tx);
        let _guard = PendingCallGuard { id, pending_calls: self.pending_calls.clone(), writer: self.writer.clone() };

        let frame = json!({ "id": id, "type": "call", "path": path, "input": input });
        if let Err(error) = self.write_frame(&frame).await {
            return Err(RawTransportError::Opaque(error.to_string()));
        }

        match rx.await {
            Ok(PendingResponse::Unary(Ok(value))) => Ok(value),
            Ok(PendingResponse::Unary(Err(shape))) => Err(RawTransportError::Shaped(shape)),
            Ok(PendingResponse::Batch(_)) => {
                Err(RawTransportError::Opaque("received a batch frame for a unary call".to_string()))
            }
            Err(_) => Err(RawTransportError::Opaque("transport closed before responding".to_string())),
        }
    }

    async fn call_batch(
        &self,
        requests: Vec<BatchRequestItem>,
    ) -> Option<Result<Vec<BatchResultItem>, RawTransportError>> {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending_calls.insert(id, tx);
        let _guard = PendingCallGuard { id, pending_calls: self.pending_calls.clone(), writer: self.writer.clone() };

        let wire_requests: Vec<Value> = requests
            .iter()
            .map(|item| json!({ "id": item.id, "path": item.path, "input": item.input }))
            .collect();
        let frame = json!({ "id": id, "type": "callBatch", "requests": wire_requests });
        if let Err(error) = self.write_frame(&frame).await {
            return Some(Err(RawTransportError::Opaque(error.to_string())));
        }

        match rx.await {
            Ok(PendingResponse::Batch(Ok(results))) => Some(Ok(results)),
            Ok(PendingResponse::Batch(Err(shape))) => Some(Err(RawTransportError::Shaped(shape))),
            Ok(PendingResponse::Unary(_)) => {
                Some(Err(RawTransportError::Opaque("received a unary frame for a batch call".to_string())))
            }
            Err(_) => Some(Err(RawTransportError::Opaque("transport closed before responding".to_string()))),
        }
    }

    async fn subscribe(
        &self,
        path: &str,
        input: Option<Value>,
    ) -> Result<Box<dyn EventSequence>, RawTransportError> {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::channel(256);
        self.pending_subs.insert(id, tx);

        let frame = json!({ "id": id, "type": "subscribe", "path": path, "input": input });
        if let Err(error) = self.write_frame(&frame).await {
            self.pending_subs.remove(&id);
            return Err(RawTransportError::Opaque(error.to_string()));
        }

        Ok(Box::new(StdioEventSequence {
            id,
            receiver: rx,
            writer: self.writer.clone(),
            pending_subs: self.pending_subs.clone(),
            cancelled: false,
        }))
    }
}

struct StdioEventSequence {
    id: u64,
    receiver: mpsc::Receiver<TransportEvent>,
    writer: Arc<Writer>,
    pending_subs: Arc<DashMap<u64, mpsc::Sender<TransportEvent>>>,
    cancelled: bool,
}

#[async_trait]
impl EventSequence for StdioEventSequence {
    async fn next(&mut self) -> Option<TransportEvent> {
        if self.cancelled {
            return None;
        }
        self.receiver.recv().await
    }

    async fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.pending_subs.remove(&self.id);
        self.receiver.close();
        let frame = json!({ "id": self.id, "type": "cancel" });
        let _ = write_frame_to(&self.writer, &frame).await;
    }
}
