//! Request context, the interceptor chain, and the standard interceptors.

mod builtin;
mod context;
mod middleware;

pub use builtin::{
    AuthInterceptor, DedupeInterceptor, ErrorHandlerInterceptor, LoggingInterceptor,
    RetryInterceptor, TimingInterceptor,
};
pub use context::{ProcedureKind, RequestContext};
pub use middleware::{DynStep, Interceptor, InterceptorChain, Next};
