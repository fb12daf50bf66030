//! Deterministic canonical string form of a JSON value.
//!
//! Used as the dedup key component and for stable logging; two values equal
//! up to key order must canonicalize to the same string.

use serde_json::Value;

/// The sentinel returned for an absent/`undefined` input — distinct from the
/// four-character string `"undefined"`, since a caller that actually passes
/// the string `"undefined"` is not the same call as passing no input.
pub const UNDEFINED_SENTINEL: &str = "\u{0}undefined\u{0}";

/// Render `value` as a deterministic canonical string.
///
/// `None` models the `undefined` input and canonicalizes to
/// [`UNDEFINED_SENTINEL`] rather than the JSON literal `"undefined"` — the
/// two must never collide, since a caller passing the string `"undefined"`
/// as an actual input is a different dedup key than passing no input at all.
pub fn canonical(value: Option<&Value>) -> String {
    match value {
        None => UNDEFINED_SENTINEL.to_string(),
        Some(v) => canonical_value(v),
    }
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).expect("string always encodes"),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_value).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).expect("key always encodes"),
                        canonical_value(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}
