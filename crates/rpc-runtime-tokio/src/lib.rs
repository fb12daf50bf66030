//! Tokio bindings for `rpc-core`'s runtime seams.
//!
//! [`TokioRuntime`] implements [`rpc_core::runtime::AsyncRuntime`] directly
//! on top of `tokio::time::sleep` and `tokio::spawn`. [`StdioTransport`]
//! implements [`rpc_core::transport::Transport`] over a pair of
//! newline-delimited-JSON byte streams — the shape of a single pipe carrying
//! request/response messages plus server-pushed events that the runtime
//! specification assumes as its transport.

mod runtime;
mod stdio_transport;

pub use runtime::TokioRuntime;
pub use stdio_transport::{StdioTransport, StdioTransportError};
