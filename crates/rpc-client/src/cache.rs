//! The reactive-cache adapter (§6 "Cache adapter"): per-procedure
//! `{queryKey, queryFn}` / `{mutationKey, mutationFn}` / infinite-query
//! descriptors for an external reactive cache library (TanStack Query and
//! kin) to consume. This crate never depends on such a library — the
//! descriptors are plain structs the caller's own integration wires up.

use std::sync::Arc;

use serde_json::Value;

use rpc_core::error::{RpcError, ValidationIssue};
use rpc_core::path::ProcedurePath;
use rpc_core::runtime::{AsyncRuntime, BoxFuture};
use rpc_core::ProcedureKind;

use crate::contract::ProcedureHandle;

/// A zero-argument async thunk that performs the query call.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;
/// An async thunk that performs the mutation call with the given input.
pub type MutationFn = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;
/// An async thunk that performs one page of an infinite query given the
/// current page parameter.
pub type PageQueryFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;
/// Derives the next (or previous) page parameter from the last page fetched
/// and the full accumulated page list, or `None` once exhausted.
pub type PageParamFn = Arc<dyn Fn(&Value, &[Value]) -> Option<Value> + Send + Sync>;
/// Maps a page parameter to the procedure input used to fetch that page.
pub type PageInputFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// `queryOptions({input, enabled?}) → {queryKey, queryFn, enabled}`.
pub struct QueryOptions {
    pub query_key: Value,
    pub query_fn: QueryFn,
    pub enabled: bool,
}

/// `mutationOptions() → {mutationKey, mutationFn}`.
pub struct MutationOptions {
    pub mutation_key: Value,
    pub mutation_fn: MutationFn,
}

/// Parameters accepted by [`CacheAdapter::infinite_options`].
pub struct InfiniteParams {
    pub input_for_page: PageInputFn,
    pub initial_page_param: Value,
    pub get_next_page_param: PageParamFn,
    pub get_previous_page_param: Option<PageParamFn>,
    pub enabled: Option<bool>,
}

/// `infiniteOptions({input(pageParam), initialPageParam, getNextPageParam,
/// getPreviousPageParam?, enabled?})`.
pub struct InfiniteOptions {
    pub query_key: Value,
    pub query_fn: PageQueryFn,
    pub initial_page_param: Value,
    pub get_next_page_param: PageParamFn,
    pub get_previous_page_param: Option<PageParamFn>,
    pub enabled: bool,
}

/// Builds cache descriptors for one procedure path. Constructed from a
/// resolved [`ProcedureHandle`] so the adapter inherits the same
/// contract-validated path and kind the proxy would dispatch through.
pub struct CacheAdapter<R: AsyncRuntime> {
    client: Arc<rpc_core::client::Client<R>>,
    path: ProcedurePath,
    kind: ProcedureKind,
}

impl<R: AsyncRuntime> CacheAdapter<R> {
    pub fn new(handle: &ProcedureHandle<R>) -> Self {
        Self {
            client: handle.client().clone(),
            path: handle.path().clone(),
            kind: handle.kind(),
        }
    }

    pub fn query_options(&self, input: Option<Value>, enabled: Option<bool>) -> Result<QueryOptions, RpcError> {
        self.require_kind(ProcedureKind::Query, "query_options")?;

        let query_key = key(&self.path, input.as_ref());
        let client = self.client.clone();
        let path = self.path.clone();
        let query_fn: QueryFn = Arc::new(move || {
            let client = client.clone();
            let path = path.clone();
            let input = input.clone();
            Box::pin(async move { client.call(path.as_str(), input, ProcedureKind::Query).await })
        });

        Ok(QueryOptions {
            query_key,
            query_fn,
            enabled: enabled.unwrap_or(true),
        })
    }

    pub fn mutation_options(&self) -> Result<MutationOptions, RpcError> {
        self.require_kind(ProcedureKind::Mutation, "mutation_options")?;

        let mutation_key = key(&self.path, None);
        let client = self.client.clone();
        let path = self.path.clone();
        let mutation_fn: MutationFn = Arc::new(move |input| {
            let client = client.clone();
            let path = path.clone();
            Box::pin(async move { client.call(path.as_str(), input, ProcedureKind::Mutation).await })
        });

        Ok(MutationOptions { mutation_key, mutation_fn })
    }

    pub fn infinite_options(&self, params: InfiniteParams) -> Result<InfiniteOptions, RpcError> {
        self.require_kind(ProcedureKind::Query, "infinite_options")?;

        let query_key = infinite_key(&self.path, None);
        let client = self.client.clone();
        let path = self.path.clone();
        let input_for_page = params.input_for_page;
        let query_fn: PageQueryFn = Arc::new(move |page_param| {
            let client = client.clone();
            let path = path.clone();
            let input = input_for_page(&page_param);
            Box::pin(async move { client.call(path.as_str(), input, ProcedureKind::Query).await })
        });

        Ok(InfiniteOptions {
            query_key,
            query_fn,
            initial_page_param: params.initial_page_param,
            get_next_page_param: params.get_next_page_param,
            get_previous_page_param: params.get_previous_page_param,
            enabled: params.enabled.unwrap_or(true),
        })
    }

    /// `key({input?}) → queryKey`.
    pub fn key(&self, input: Option<&Value>) -> Value {
        key(&self.path, input)
    }

    /// `key({input?, type: "infinite"}) → queryKey` with the `"infinite"`
    /// segment inserted between the path and the input.
    pub fn infinite_key(&self, input: Option<&Value>) -> Value {
        infinite_key(&self.path, input)
    }

    fn require_kind(&self, expected: ProcedureKind, operation: &str) -> Result<(), RpcError> {
        if self.kind != expected {
            return Err(RpcError::validation(
                self.path.as_str(),
                vec![ValidationIssue::new(
                    self.path.as_str(),
                    format!("{operation} requires a {expected:?} procedure, found {:?}", self.kind),
                    "WRONG_PROCEDURE_KIND",
                )],
            ));
        }
        Ok(())
    }
}

/// `[...pathSegments]` if no input, else `[...pathSegments, input]`.
pub fn key(path: &ProcedurePath, input: Option<&Value>) -> Value {
    let mut segments: Vec<Value> = path.segments().map(|s| Value::String(s.to_string())).collect();
    if let Some(input) = input {
        segments.push(input.clone());
    }
    Value::Array(segments)
}

/// Like [`key`] but with the literal segment `"infinite"` inserted between
/// the path and the input.
pub fn infinite_key(path: &ProcedurePath, input: Option<&Value>) -> Value {
    let mut segments: Vec<Value> = path.segments().map(|s| Value::String(s.to_string())).collect();
    segments.push(Value::String("infinite".to_string()));
    if let Some(input) = input {
        segments.push(input.clone());
    }
    Value::Array(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_appends_input_only_when_present() {
        let path = rpc_core::path::validate_path("user.get").unwrap();
        assert_eq!(key(&path, None), serde_json::json!(["user", "get"]));
        assert_eq!(
            key(&path, Some(&serde_json::json!({ "id": 1 }))),
            serde_json::json!(["user", "get", { "id": 1 }])
        );
    }

    #[test]
    fn infinite_key_inserts_the_infinite_segment() {
        let path = rpc_core::path::validate_path("feed.list").unwrap();
        assert_eq!(infinite_key(&path, None), serde_json::json!(["feed", "list", "infinite"]));
        assert_eq!(
            infinite_key(&path, Some(&serde_json::json!({ "cursor": "a" }))),
            serde_json::json!(["feed", "list", "infinite", { "cursor": "a" }])
        );
    }
}
