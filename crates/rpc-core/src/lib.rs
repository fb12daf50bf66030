//! Transport-agnostic client-side RPC runtime core.
//!
//! This crate is the engine room behind a contract-driven client: given an
//! injected [`transport::Transport`], it turns a `(path, input)` pair into a
//! typed result through an [`pipeline::InterceptorChain`], coordinates
//! in-flight [`dedup`]lication, schedules [`retry`] attempts with jittered
//! backoff, fans a batch of calls out under a concurrency cap
//! ([`dispatch`]), and runs server-pushed event streams through a
//! restartable, multi-consumer [`subscription`] engine.
//!
//! Nothing in here knows about sockets, pipes, or a UI framework — those are
//! supplied by a concrete [`transport::Transport`] and a concrete
//! [`runtime::AsyncRuntime`] (see `rpc-runtime-tokio`). The contract-tree
//! path proxy and the reactive-cache adapter are layered on top, in
//! `rpc-client`.

pub mod canonical;
pub mod client;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod retry;
pub mod runtime;
pub mod subscription;
pub mod transport;

mod sealed;

pub use client::{Client, ClientConfig};
pub use error::{ErrorShape, RpcError, ValidationIssue};
pub use path::{validate_path, ProcedurePath};
pub use pipeline::ProcedureKind;
