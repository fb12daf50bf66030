//! The contract tree and path-building procedure proxy (§6's
//! "contract-driven client surface").
//!
//! Rather than a `Deref`/macro-based runtime proxy, the contract is an
//! explicit tree resolved once at construction — the same flat,
//! push-everything-up-front shape the teacher's `router/catalog.rs` uses
//! for its `RouteCatalog`, rather than ad hoc reflection. A caller builds a
//! [`Contract`] by registering every dotted path up front, then resolves
//! [`ProcedureHandle`]s out of a [`ContractClient`] by path; an unknown or
//! kind-mismatched path fails before the transport is ever touched.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use rpc_core::client::Client;
use rpc_core::error::{RpcError, ValidationIssue};
use rpc_core::path::{validate_path, ProcedurePath};
use rpc_core::runtime::AsyncRuntime;
use rpc_core::subscription::{Consumer, Subscription};
use rpc_core::ProcedureKind;

/// One node of the contract tree: either a typed procedure leaf or a nested
/// namespace.
#[derive(Clone, Debug)]
pub enum ContractNode {
    Leaf(ProcedureKind),
    Branch(BTreeMap<String, ContractNode>),
}

/// Builds a [`Contract`] by registering dotted paths one at a time.
#[derive(Clone, Debug, Default)]
pub struct ContractBuilder {
    root: BTreeMap<String, ContractNode>,
}

impl ContractBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(self, path: &str) -> Self {
        self.leaf(path, ProcedureKind::Query)
    }

    pub fn mutation(self, path: &str) -> Self {
        self.leaf(path, ProcedureKind::Mutation)
    }

    pub fn subscription(self, path: &str) -> Self {
        self.leaf(path, ProcedureKind::Subscription)
    }

    fn leaf(mut self, path: &str, kind: ProcedureKind) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        insert_leaf(&mut self.root, &segments, kind);
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            root: ContractNode::Branch(self.root),
        }
    }
}

fn insert_leaf(into: &mut BTreeMap<String, ContractNode>, segments: &[&str], kind: ProcedureKind) {
    let [first, rest @ ..] = segments else {
        return;
    };
    if rest.is_empty() {
        into.insert((*first).to_string(), ContractNode::Leaf(kind));
        return;
    }
    let branch = into
        .entry((*first).to_string())
        .or_insert_with(|| ContractNode::Branch(BTreeMap::new()));
    match branch {
        ContractNode::Branch(children) => insert_leaf(children, rest, kind),
        ContractNode::Leaf(_) => {
            // A shallower path was already registered as a leaf; the deeper
            // registration wins rather than silently dropping it.
            let mut children = BTreeMap::new();
            insert_leaf(&mut children, rest, kind);
            *branch = ContractNode::Branch(children);
        }
    }
}

/// An immutable tree of procedure descriptors, resolved once at
/// construction time.
#[derive(Clone, Debug)]
pub struct Contract {
    root: ContractNode,
}

impl Contract {
    pub fn builder() -> ContractBuilder {
        ContractBuilder::new()
    }

    /// Resolve a dotted path to its declared kind, or a validation error if
    /// the path is malformed or absent from the tree.
    pub fn resolve(&self, path: &str) -> Result<(ProcedurePath, ProcedureKind), RpcError> {
        let validated = validate_path(path)?;
        let mut node = &self.root;
        for segment in validated.segments() {
            match node {
                ContractNode::Branch(children) => {
                    node = children.get(segment).ok_or_else(|| unknown_path(path))?;
                }
                ContractNode::Leaf(_) => return Err(unknown_path(path)),
            }
        }
        match node {
            ContractNode::Leaf(kind) => Ok((validated, *kind)),
            ContractNode::Branch(_) => Err(unknown_path(path)),
        }
    }
}

fn unknown_path(path: &str) -> RpcError {
    RpcError::validation(
        path,
        vec![ValidationIssue::new(
            path,
            "path is not declared in the contract",
            "UNKNOWN_PROCEDURE",
        )],
    )
}

fn wrong_kind(path: &ProcedurePath, message: &str) -> RpcError {
    RpcError::validation(
        path.as_str(),
        vec![ValidationIssue::new(path.as_str(), message, "WRONG_PROCEDURE_KIND")],
    )
}

/// A [`Client`] paired with its [`Contract`] — the entry point a caller
/// actually holds. Procedure access goes through [`ContractClient::procedure`],
/// which validates the path against the tree before dispatch ever sees it.
pub struct ContractClient<R: AsyncRuntime> {
    client: Arc<Client<R>>,
    contract: Arc<Contract>,
}

impl<R: AsyncRuntime> ContractClient<R> {
    pub fn new(client: Arc<Client<R>>, contract: Contract) -> Self {
        Self {
            client,
            contract: Arc::new(contract),
        }
    }

    pub fn client(&self) -> &Arc<Client<R>> {
        &self.client
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Resolve `path` against the contract and return a handle bound to it.
    pub fn procedure(&self, path: &str) -> Result<ProcedureHandle<R>, RpcError> {
        let (path, kind) = self.contract.resolve(path)?;
        Ok(ProcedureHandle {
            client: self.client.clone(),
            path,
            kind,
        })
    }
}

/// A resolved, path-bound accessor: `contract.procedure("user.get")?.call(input).await`.
pub struct ProcedureHandle<R: AsyncRuntime> {
    client: Arc<Client<R>>,
    path: ProcedurePath,
    kind: ProcedureKind,
}

impl<R: AsyncRuntime> ProcedureHandle<R> {
    pub fn path(&self) -> &ProcedurePath {
        &self.path
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn client(&self) -> &Arc<Client<R>> {
        &self.client
    }

    /// Dispatch a query or mutation. Fails fast, without touching the
    /// transport, if this handle resolved to a subscription.
    pub async fn call(&self, input: Option<Value>) -> Result<Value, RpcError> {
        if self.kind == ProcedureKind::Subscription {
            return Err(wrong_kind(
                &self.path,
                "subscription procedures must be invoked through subscribe(), not call()",
            ));
        }
        self.client.call(self.path.as_str(), input, self.kind).await
    }

    /// Open a subscription. Fails fast if this handle resolved to a query or
    /// mutation.
    pub async fn subscribe(&self, input: Option<Value>) -> Result<(Subscription, Consumer), RpcError> {
        if self.kind != ProcedureKind::Subscription {
            return Err(wrong_kind(&self.path, "only subscription procedures support subscribe()"));
        }
        self.client.subscribe(self.path.as_str(), input).await
    }
}
