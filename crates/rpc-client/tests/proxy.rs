//! End-to-end coverage of the contract proxy and cache adapter against a
//! fake in-memory transport — no stdio framing involved, just the
//! `rpc-core` `Transport` contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rpc_core::client::{Client, ClientConfig};
use rpc_core::error::RawTransportError;
use rpc_core::transport::{BatchRequestItem, BatchResultItem, EventSequence, Transport};
use rpc_client::cache::CacheAdapter;
use rpc_client::contract::Contract;
use rpc_runtime_tokio::TokioRuntime;

struct EchoTransport {
    calls: AtomicU64,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn call(&self, path: &str, input: Option<Value>) -> Result<Value, RawTransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path == "user.missing" {
            return Err(RawTransportError::PlainString("not found".to_string()));
        }
        Ok(json!({ "path": path, "echo": input }))
    }

    async fn call_batch(&self, _requests: Vec<BatchRequestItem>) -> Option<Result<Vec<BatchResultItem>, RawTransportError>> {
        None
    }

    async fn subscribe(&self, _path: &str, _input: Option<Value>) -> Result<Box<dyn EventSequence>, RawTransportError> {
        Err(RawTransportError::Opaque("subscriptions unused in this test".to_string()))
    }
}

fn build_contract() -> Contract {
    Contract::builder()
        .query("user.get")
        .query("user.missing")
        .mutation("user.create")
        .query("feed.list")
        .build()
}

#[tokio::test]
async fn procedure_handle_dispatches_queries_and_mutations() {
    let transport: Arc<dyn Transport> = Arc::new(EchoTransport { calls: AtomicU64::new(0) });
    let client = Arc::new(Client::new(transport, Arc::new(TokioRuntime), ClientConfig::default()));
    let contract_client = rpc_client::contract::ContractClient::new(client, build_contract());

    let get = contract_client.procedure("user.get").unwrap();
    let result = get.call(Some(json!({ "id": 1 }))).await.unwrap();
    assert_eq!(result, json!({ "path": "user.get", "echo": { "id": 1 } }));

    let create = contract_client.procedure("user.create").unwrap();
    let result = create.call(Some(json!({ "name": "ada" }))).await.unwrap();
    assert_eq!(result, json!({ "path": "user.create", "echo": { "name": "ada" } }));
}

#[tokio::test]
async fn procedure_handle_rejects_unknown_paths_and_kind_mismatch() {
    let transport: Arc<dyn Transport> = Arc::new(EchoTransport { calls: AtomicU64::new(0) });
    let client = Arc::new(Client::new(transport, Arc::new(TokioRuntime), ClientConfig::default()));
    let contract_client = rpc_client::contract::ContractClient::new(client, build_contract());

    assert!(contract_client.procedure("user.delete").is_err());

    let get = contract_client.procedure("user.get").unwrap();
    let err = get.subscribe(None).await.unwrap_err();
    assert_eq!(err.observed_code(), rpc_core::error::codes::VALIDATION_ERROR);
}

#[tokio::test]
async fn cache_adapter_builds_keys_and_thunks_bound_to_the_client() {
    let transport: Arc<dyn Transport> = Arc::new(EchoTransport { calls: AtomicU64::new(0) });
    let client = Arc::new(Client::new(transport, Arc::new(TokioRuntime), ClientConfig::default()));
    let contract_client = rpc_client::contract::ContractClient::new(client, build_contract());

    let handle = contract_client.procedure("user.get").unwrap();
    let adapter = CacheAdapter::new(&handle);

    let input = json!({ "id": 7 });
    let options = adapter.query_options(Some(input.clone()), None).unwrap();
    assert_eq!(options.query_key, json!(["user", "get", { "id": 7 }]));
    assert!(options.enabled);

    let result = (options.query_fn)().await.unwrap();
    assert_eq!(result, json!({ "path": "user.get", "echo": { "id": 7 } }));

    let mutation_handle = contract_client.procedure("user.create").unwrap();
    let mutation_adapter = CacheAdapter::new(&mutation_handle);
    let mutation_options = mutation_adapter.mutation_options().unwrap();
    assert_eq!(mutation_options.mutation_key, json!(["user", "create"]));
    let result = (mutation_options.mutation_fn)(Some(json!({ "name": "grace" }))).await.unwrap();
    assert_eq!(result, json!({ "path": "user.create", "echo": { "name": "grace" } }));

    // Wrong-kind requests fail before the transport is touched.
    assert!(mutation_adapter.query_options(None, None).is_err());
    assert!(adapter.mutation_options().is_err());
}

#[tokio::test]
async fn infinite_options_thread_the_page_param_into_each_fetch() {
    let transport: Arc<dyn Transport> = Arc::new(EchoTransport { calls: AtomicU64::new(0) });
    let client = Arc::new(Client::new(transport, Arc::new(TokioRuntime), ClientConfig::default()));
    let contract_client = rpc_client::contract::ContractClient::new(client, build_contract());

    let handle = contract_client.procedure("feed.list").unwrap();
    let adapter = CacheAdapter::new(&handle);

    let options = adapter
        .infinite_options(rpc_client::cache::InfiniteParams {
            input_for_page: std::sync::Arc::new(|page_param| Some(json!({ "cursor": page_param }))),
            initial_page_param: json!(null),
            get_next_page_param: std::sync::Arc::new(|last_page, _all_pages| last_page.get("nextCursor").cloned()),
            get_previous_page_param: None,
            enabled: None,
        })
        .unwrap();

    assert_eq!(options.query_key, json!(["feed", "list", "infinite"]));
    let first_page = (options.query_fn)(json!("page-0")).await.unwrap();
    assert_eq!(first_page, json!({ "path": "feed.list", "echo": { "cursor": "page-0" } }));
}
