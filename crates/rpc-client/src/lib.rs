//! L4 of the runtime: a contract-driven procedure proxy and a reactive-cache
//! adapter layered on top of [`rpc_core::client::Client`]. Neither module
//! talks to a transport directly — both dispatch exclusively through the
//! `rpc-core` client they are constructed from.

pub mod cache;
pub mod contract;

pub use cache::{CacheAdapter, InfiniteOptions, InfiniteParams, MutationOptions, QueryOptions};
pub use contract::{Contract, ContractBuilder, ContractClient, ContractNode, ProcedureHandle};
