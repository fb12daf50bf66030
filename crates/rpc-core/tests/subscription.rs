//! S6 — subscription reconnect budget: two successful reconnects each
//! deliver one event, the third subscribe attempt fails outright, and the
//! would-be fourth attempt never reaches the transport because the budget
//! gate fires first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use rpc_core::error::{ErrorShape, RawTransportError};
use rpc_core::subscription::{is_max_reconnects_exceeded, BroadcastConfig, ReconnectConfig, SubscriptionEngine, SubscriptionEvent};
use rpc_core::transport::{BatchRequestItem, BatchResultItem, EventSequence, Transport, TransportEvent};
use rpc_runtime_tokio::TokioRuntime;

struct ScriptedSequence {
    events: VecDeque<TransportEvent>,
}

#[async_trait]
impl EventSequence for ScriptedSequence {
    async fn next(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    async fn cancel(&mut self) {}
}

fn retryable(message: &str) -> RawTransportError {
    RawTransportError::Shaped(ErrorShape {
        code: "INTERNAL_ERROR".to_string(),
        message: message.to_string(),
        details: None,
    })
}

/// Attempt 1 and 2 each connect, deliver one event, then fail on-stream
/// (retryable, so the engine reconnects silently). Attempt 3 fails to even
/// connect. A would-be attempt 4 is blocked by the reconnect budget before
/// `subscribe` is called again.
struct ScriptedTransport {
    attempt: AtomicU32,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, _path: &str, _input: Option<Value>) -> Result<Value, RawTransportError> {
        unimplemented!("not exercised by subscription tests")
    }

    async fn call_batch(&self, _requests: Vec<BatchRequestItem>) -> Option<Result<Vec<BatchResultItem>, RawTransportError>> {
        None
    }

    async fn subscribe(&self, _path: &str, _input: Option<Value>) -> Result<Box<dyn EventSequence>, RawTransportError> {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        match attempt {
            0 => Ok(Box::new(ScriptedSequence {
                events: VecDeque::from(vec![
                    TransportEvent::Data(json!({ "seq": 1 })),
                    TransportEvent::Error(retryable("stream 1 dropped")),
                ]),
            })),
            1 => Ok(Box::new(ScriptedSequence {
                events: VecDeque::from(vec![
                    TransportEvent::Data(json!({ "seq": 2 })),
                    TransportEvent::Error(retryable("stream 2 dropped")),
                ]),
            })),
            _ => Err(retryable("connection refused")),
        }
    }
}

#[tokio::test]
async fn s6_reconnect_budget_is_exhausted_after_two_attempts() {
    let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport { attempt: AtomicU32::new(0) });
    let engine = SubscriptionEngine::new(transport, Arc::new(TokioRuntime))
        .with_reconnect(ReconnectConfig {
            auto_reconnect: true,
            max_reconnects: 2,
            reconnect_delay: Duration::from_millis(10),
            jitter: false,
        })
        .with_broadcast(BroadcastConfig::default());

    let (_subscription, mut consumer) = engine.subscribe("feed.updates", None).await.unwrap();

    let budget = Duration::from_secs(2);

    let first = tokio::time::timeout(budget, consumer.recv()).await.unwrap().unwrap();
    assert!(matches!(first, SubscriptionEvent::Data(v) if v == json!({ "seq": 1 })));

    let second = tokio::time::timeout(budget, consumer.recv()).await.unwrap().unwrap();
    assert!(matches!(second, SubscriptionEvent::Data(v) if v == json!({ "seq": 2 })));

    let third = tokio::time::timeout(budget, consumer.recv()).await.unwrap().unwrap();
    match third {
        SubscriptionEvent::Error(error) => {
            assert!(is_max_reconnects_exceeded(&error));
            let shape = error.to_shape();
            assert_eq!(shape.details.unwrap().get("attempts").and_then(Value::as_u64), Some(2));
        }
        other => panic!("expected a terminal error event, got {other:?}"),
    }

    // Terminal outcome observed at most once: subsequent recv() calls return
    // None without blocking.
    let fourth = tokio::time::timeout(budget, consumer.recv()).await.unwrap();
    assert!(fourth.is_none());
}

#[tokio::test]
async fn a_late_joining_consumer_observes_completion_immediately() {
    let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport { attempt: AtomicU32::new(2) });
    let engine = SubscriptionEngine::new(transport, Arc::new(TokioRuntime)).with_reconnect(ReconnectConfig {
        auto_reconnect: false,
        max_reconnects: 0,
        reconnect_delay: Duration::from_millis(1),
        jitter: false,
    });

    let (subscription, mut consumer) = engine.subscribe("feed.updates", None).await.unwrap();
    let budget = Duration::from_secs(2);

    let terminal = tokio::time::timeout(budget, consumer.recv()).await.unwrap();
    assert!(matches!(terminal, Some(SubscriptionEvent::Error(_))));
    assert!(tokio::time::timeout(budget, consumer.recv()).await.unwrap().is_none());

    // attaching after completion delivers the shutdown sentinel, never a
    // fresh connection attempt.
    let mut late_consumer = subscription.consumer().await;
    let late = tokio::time::timeout(budget, late_consumer.recv()).await.unwrap();
    assert!(late.is_none());
}
