//! Typed error taxonomy for the dispatch and subscription layers.
//!
//! Every failure the runtime can observe collapses into [`RpcError`], a
//! closed, tag-discriminated sum rather than an inheritance hierarchy — the
//! five kinds (`Call`, `Timeout`, `Cancelled`, `Validation`, `Network`) are
//! disjoint and mutually exhaustive. Predicates and retry policy consume the
//! `code()`/`category()` pair rather than matching on `Display` text.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Virtual error codes reported for non-`Call` kinds.
pub mod codes {
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const UNKNOWN: &str = "UNKNOWN";

    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const MAX_RECONNECTS_EXCEEDED: &str = "MAX_RECONNECTS_EXCEEDED";
}

/// A single field-level validation failure, as reported by a schema rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// The runtime's closed error taxonomy.
///
/// All five kinds carry enough context to be reconstructed after crossing a
/// serialization boundary ([`ErrorShape`]), and all five answer `code()` and
/// `is_retryable()` without the caller needing to downcast.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Logical failure returned by the host: the dispatch reached the
    /// transport and the transport answered with a domain-level error.
    #[error("{code}: {message}")]
    Call {
        code: String,
        message: String,
        details: Option<Value>,
    },

    /// Dispatch exceeded its configured time budget.
    #[error("timeout after {timeout_ms}ms calling {path}")]
    Timeout { path: String, timeout_ms: u64 },

    /// The caller (or an interceptor acting on the caller's behalf) cancelled
    /// the dispatch before it settled.
    #[error("cancelled calling {path}{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled { path: String, reason: Option<String> },

    /// Input or output failed an optional schema validator.
    #[error("validation failed calling {path} ({} issue(s))", issues.len())]
    Validation {
        path: String,
        issues: Vec<ValidationIssue>,
    },

    /// The transport itself failed (connection reset, DNS failure, etc.)
    /// before any application-level response was produced.
    #[error("network error calling {path}: {original_error}")]
    Network { path: String, original_error: String },
}

impl RpcError {
    /// The code a caller observes: `Call.code` verbatim, or one of the
    /// virtual codes in [`codes`] for the other four kinds.
    pub fn observed_code(&self) -> &str {
        match self {
            RpcError::Call { code, .. } => code,
            RpcError::Timeout { .. } => codes::TIMEOUT,
            RpcError::Cancelled { .. } => codes::CANCELLED,
            RpcError::Validation { .. } => codes::VALIDATION_ERROR,
            RpcError::Network { .. } => codes::NETWORK_ERROR,
        }
    }

    /// The dotted procedure path this error is attached to, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            RpcError::Call { .. } => None,
            RpcError::Timeout { path, .. }
            | RpcError::Cancelled { path, .. }
            | RpcError::Validation { path, .. }
            | RpcError::Network { path, .. } => Some(path),
        }
    }

    /// Retryable iff the observed code is in the known-transient set,
    /// irrespective of which kind produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.observed_code(),
            codes::INTERNAL_ERROR
                | codes::TIMEOUT
                | codes::UNAVAILABLE
                | codes::SERVICE_UNAVAILABLE
                | codes::NETWORK_ERROR
        )
    }

    pub fn call(code: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError::Call {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn call_with_details(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        RpcError::Call {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn timeout(path: impl Into<String>, timeout_ms: u64) -> Self {
        RpcError::Timeout {
            path: path.into(),
            timeout_ms,
        }
    }

    pub fn cancelled(path: impl Into<String>, reason: Option<String>) -> Self {
        RpcError::Cancelled {
            path: path.into(),
            reason,
        }
    }

    pub fn validation(path: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        RpcError::Validation {
            path: path.into(),
            issues,
        }
    }

    pub fn network(path: impl Into<String>, original_error: impl Into<String>) -> Self {
        RpcError::Network {
            path: path.into(),
            original_error: original_error.into(),
        }
    }

    /// `{code: "MAX_RECONNECTS_EXCEEDED", details: {attempts, max_reconnects, path}}`.
    pub fn max_reconnects_exceeded(path: &str, attempts: u32, max_reconnects: u32) -> Self {
        RpcError::call_with_details(
            codes::MAX_RECONNECTS_EXCEEDED,
            format!("exceeded {max_reconnects} reconnect attempt(s) for {path}"),
            serde_json::json!({
                "attempts": attempts,
                "maxReconnects": max_reconnects,
                "path": path,
            }),
        )
    }

    /// Whether this is a `RATE_LIMITED` call error.
    pub fn is_rate_limit_error(&self) -> bool {
        self.observed_code() == codes::RATE_LIMITED
    }

    /// `details.retry_after_ms` for a `RATE_LIMITED` error, if present.
    pub fn rate_limit_retry_after(&self) -> Option<u64> {
        match self {
            RpcError::Call {
                code,
                details: Some(details),
                ..
            } if code == codes::RATE_LIMITED => details
                .get("retry_after_ms")
                .and_then(Value::as_u64),
            _ => None,
        }
    }

    /// Convert to the wire shape used to transport an error across the
    /// process boundary.
    pub fn to_shape(&self) -> ErrorShape {
        match self {
            RpcError::Call {
                code,
                message,
                details,
            } => ErrorShape {
                code: code.clone(),
                message: message.clone(),
                details: details.clone(),
            },
            RpcError::Timeout { path, timeout_ms } => ErrorShape {
                code: codes::TIMEOUT.to_string(),
                message: format!("timeout after {timeout_ms}ms calling {path}"),
                details: Some(serde_json::json!({ "path": path, "timeoutMs": timeout_ms })),
            },
            RpcError::Cancelled { path, reason } => ErrorShape {
                code: codes::CANCELLED.to_string(),
                message: reason.clone().unwrap_or_else(|| format!("cancelled calling {path}")),
                details: Some(serde_json::json!({ "path": path, "reason": reason })),
            },
            RpcError::Validation { path, issues } => ErrorShape {
                code: codes::VALIDATION_ERROR.to_string(),
                message: format!("validation failed calling {path}"),
                details: Some(serde_json::json!({
                    "path": path,
                    "issues": issues.iter().map(|i| serde_json::json!({
                        "path": i.path, "message": i.message, "code": i.code,
                    })).collect::<Vec<_>>(),
                })),
            },
            RpcError::Network {
                path,
                original_error,
            } => ErrorShape {
                code: codes::NETWORK_ERROR.to_string(),
                message: original_error.clone(),
                details: Some(serde_json::json!({ "path": path })),
            },
        }
    }

    /// Reconstruct an [`RpcError`] from its wire shape: kind is recovered
    /// from the code, and `timeout_ms`/`issues` are recovered from `details`
    /// when present.
    pub fn from_shape(path: &str, shape: ErrorShape) -> Self {
        match shape.code.as_str() {
            codes::TIMEOUT => {
                let timeout_ms = shape
                    .details
                    .as_ref()
                    .and_then(|d| d.get("timeoutMs"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                RpcError::timeout(path, timeout_ms)
            }
            codes::CANCELLED => {
                let reason = shape
                    .details
                    .as_ref()
                    .and_then(|d| d.get("reason"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                RpcError::cancelled(path, reason)
            }
            codes::VALIDATION_ERROR => {
                let issues = shape
                    .details
                    .as_ref()
                    .and_then(|d| d.get("issues"))
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .map(|v| {
                                ValidationIssue::new(
                                    v.get("path").and_then(Value::as_str).unwrap_or_default(),
                                    v.get("message").and_then(Value::as_str).unwrap_or_default(),
                                    v.get("code").and_then(Value::as_str).unwrap_or_default(),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                RpcError::validation(path, issues)
            }
            codes::NETWORK_ERROR => RpcError::network(path, shape.message),
            _ => RpcError::Call {
                code: shape.code,
                message: shape.message,
                details: shape.details,
            },
        }
    }
}

/// Serializable error shape: `{code, message, details?}`.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Classify a raw transport-layer failure into the typed taxonomy. No raw
/// transport error is ever allowed to escape the dispatch boundary — this is
/// the single seam through which untyped failures enter.
pub enum RawTransportError {
    /// A JSON-shaped object the transport already serialized as `{code, message, details?}`.
    Shaped(ErrorShape),
    /// The transport reported an abort; `is_timeout` tells us whether our own
    /// deadline fired (vs. an externally requested cancel).
    Aborted { is_timeout: bool, timeout_ms: u64 },
    /// A plain string message with no further structure.
    PlainString(String),
    /// Anything else — formatted with `{:?}`/`Display` by the caller.
    Opaque(String),
}

pub fn classify_transport_error(path: &str, raw: RawTransportError) -> RpcError {
    match raw {
        RawTransportError::Shaped(shape) => RpcError::from_shape(path, shape),
        RawTransportError::Aborted {
            is_timeout: true,
            timeout_ms,
        } => RpcError::timeout(path, timeout_ms),
        RawTransportError::Aborted {
            is_timeout: false, ..
        } => RpcError::cancelled(path, None),
        RawTransportError::PlainString(message) => RpcError::call(codes::UNKNOWN, message),
        RawTransportError::Opaque(message) => RpcError::call(codes::UNKNOWN, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_kind_predicate_holds() {
        let errors = vec![
            RpcError::call("BAD_REQUEST", "nope"),
            RpcError::timeout("a.b", 50),
            RpcError::cancelled("a.b", None),
            RpcError::validation("a.b", vec![]),
            RpcError::network("a.b", "reset"),
        ];
        for e in errors {
            let kinds = [
                matches!(e, RpcError::Call { .. }),
                matches!(e, RpcError::Timeout { .. }),
                matches!(e, RpcError::Cancelled { .. }),
                matches!(e, RpcError::Validation { .. }),
                matches!(e, RpcError::Network { .. }),
            ];
            assert_eq!(kinds.iter().filter(|b| **b).count(), 1);
        }
    }

    #[test]
    fn roundtrip_preserves_kind_and_key_fields() {
        let original = RpcError::timeout("users.get", 250);
        let shape = original.to_shape();
        let restored = RpcError::from_shape("users.get", shape);
        assert!(matches!(restored, RpcError::Timeout { timeout_ms: 250, .. }));

        let original = RpcError::validation(
            "users.create",
            vec![ValidationIssue::new("name", "required", "required")],
        );
        let shape = original.to_shape();
        let restored = RpcError::from_shape("users.create", shape);
        match restored {
            RpcError::Validation { issues, .. } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].path, "name");
            }
            other => panic!("expected Validation, got {other:?}"),
        }

        let original = RpcError::call("NOT_FOUND", "missing");
        let shape = original.to_shape();
        let restored = RpcError::from_shape("users.get", shape);
        assert_eq!(restored.observed_code(), "NOT_FOUND");
    }

    #[test]
    fn retryability_matches_table() {
        assert!(RpcError::call(codes::INTERNAL_ERROR, "x").is_retryable());
        assert!(RpcError::timeout("a", 1).is_retryable());
        assert!(RpcError::call(codes::UNAVAILABLE, "x").is_retryable());
        assert!(RpcError::network("a", "x").is_retryable());

        assert!(!RpcError::call(codes::UNAUTHORIZED, "x").is_retryable());
        assert!(!RpcError::call(codes::FORBIDDEN, "x").is_retryable());
        assert!(!RpcError::call(codes::BAD_REQUEST, "x").is_retryable());
        assert!(!RpcError::call(codes::NOT_FOUND, "x").is_retryable());
        assert!(!RpcError::validation("a", vec![]).is_retryable());
        assert!(!RpcError::cancelled("a", None).is_retryable());
    }

    #[test]
    fn rate_limit_helpers() {
        let err = RpcError::call_with_details(
            codes::RATE_LIMITED,
            "slow down",
            serde_json::json!({ "retry_after_ms": 5000 }),
        );
        assert!(err.is_rate_limit_error());
        assert_eq!(err.rate_limit_retry_after(), Some(5000));
    }
}
