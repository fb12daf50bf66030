//! Single-call dispatch: interceptor chain → transport, with an optional
//! dispatch-level timeout race and best-effort lifecycle hooks.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{select, Either};
use serde_json::Value;
use tracing::info_span;
use tracing::Instrument;

use crate::error::{classify_transport_error, RawTransportError, RpcError};
use crate::pipeline::{InterceptorChain, ProcedureKind, RequestContext};
use crate::path::validate_path;
use crate::runtime::TimeDriver;
use crate::transport::Transport;

/// Lifecycle hooks fired around a dispatch. Exceptions (panics) inside a hook
/// are not caught by this crate — hooks are plain infallible callbacks by
/// construction, which is the idiomatic way to make "best effort, never
/// derails the outcome" a compile-time guarantee instead of a runtime
/// catch-unwind dance around an `await` point.
#[derive(Clone, Default)]
pub struct DispatchHooks {
    pub on_request: Option<Arc<dyn Fn(&mut RequestContext) + Send + Sync>>,
    pub on_response: Option<Arc<dyn Fn(&RequestContext, &Value) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&RequestContext, &RpcError) + Send + Sync>>,
}

/// Dispatch one non-subscription call.
pub async fn dispatch_call(
    transport: Arc<dyn Transport>,
    chain: &InterceptorChain,
    hooks: &DispatchHooks,
    time: &dyn TimeDriver,
    path: &str,
    input: Option<Value>,
    kind: ProcedureKind,
    timeout: Option<Duration>,
) -> Result<Value, RpcError> {
    let validated = validate_path(path)?;
    let mut ctx = RequestContext::new(validated.as_str(), input, kind);

    if let Some(on_request) = &hooks.on_request {
        on_request(&mut ctx);
    }

    let terminal: Arc<crate::pipeline::DynStep> = Arc::new(move |ctx: &mut RequestContext| {
        let transport = transport.clone();
        let path = ctx.path.clone();
        let input = ctx.input.clone();
        Box::pin(async move {
            transport
                .call(&path, input)
                .await
                .map_err(|raw| classify_transport_error(&path, raw))
        })
    });

    let span = info_span!("rpc.dispatch", path = %ctx.path, kind = ?ctx.kind);
    let run = chain.run(&mut ctx, terminal).instrument(span);

    let result = match timeout {
        None => run.await,
        Some(budget) => {
            let sleep = time.sleep(budget);
            match select(Box::pin(run), Box::pin(sleep)).await {
                Either::Left((result, _)) => result,
                Either::Right((_, _)) => Err(RpcError::timeout(&ctx.path, budget.as_millis() as u64)),
            }
        }
    };

    match &result {
        Ok(value) => {
            if let Some(on_response) = &hooks.on_response {
                on_response(&ctx, value);
            }
        }
        Err(error) => {
            if let Some(on_error) = &hooks.on_error {
                on_error(&ctx, error);
            }
        }
    }

    result
}

/// Convert any transport-produced error the caller already classified (e.g.
/// the subscription engine's adapter) into a uniform shape. Re-exported here
/// since dispatch and subscription share the same classifier entry point.
pub fn classify(path: &str, raw: RawTransportError) -> RpcError {
    classify_transport_error(path, raw)
}
