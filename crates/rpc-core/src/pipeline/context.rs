//! The request context threaded through a single dispatch.

use std::collections::HashMap;

use serde_json::Value;

/// The three procedure kinds a contract entry can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    Query,
    Mutation,
    Subscription,
}

/// `{path, input, type, meta}` — lives for exactly one dispatch. `meta` is
/// mutable so interceptors can attach auth tokens, correlation ids, or timing
/// marks; nothing outside this one dispatch observes it.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub path: String,
    pub input: Option<Value>,
    pub kind: ProcedureKind,
    pub meta: HashMap<String, Value>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, input: Option<Value>, kind: ProcedureKind) -> Self {
        Self {
            path: path.into(),
            input,
            kind,
            meta: HashMap::new(),
        }
    }
}
