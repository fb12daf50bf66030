//! Procedure path parsing and validation.
//!
//! A path is a dotted sequence of segments matching `[A-Za-z_][A-Za-z0-9_]*`:
//! nonempty, no leading/trailing/adjacent dots, no `/`, no whitespace or
//! control characters. Validation is pure and synchronous — no I/O.

use crate::error::RpcError;

/// A validated, normalized procedure path. Construction is the only way to
/// obtain one, so downstream code never re-checks the grammar.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcedurePath(String);

impl ProcedurePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl std::fmt::Display for ProcedurePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for ProcedurePath {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Validate `s` and return its normalized form (identity when already
/// normalized), or a [`RpcError::Validation`] naming the offending segment.
pub fn validate_path(s: &str) -> Result<ProcedurePath, RpcError> {
    if s.is_empty() {
        return Err(path_error(s, "", "path must not be empty"));
    }

    for segment in s.split('.') {
        if segment.is_empty() {
            return Err(path_error(
                s,
                segment,
                "path must not have empty, leading, trailing, or adjacent dot segments",
            ));
        }
        if !is_valid_segment(segment) {
            return Err(path_error(
                s,
                segment,
                "segment must match [A-Za-z_][A-Za-z0-9_]*",
            ));
        }
    }

    Ok(ProcedurePath(s.to_string()))
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn path_error(path: &str, segment: &str, message: &str) -> RpcError {
    RpcError::validation(
        path,
        vec![crate::error::ValidationIssue::new(
            segment,
            message,
            "INVALID_PATH",
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ascii_identifier_segments() {
        assert!(validate_path("user.get").is_ok());
        assert!(validate_path("a").is_ok());
        assert!(validate_path("_private.inner_method").is_ok());
        assert!(validate_path("a1.b2.c3").is_ok());
    }

    #[test]
    fn rejects_empty_and_malformed_paths() {
        assert!(validate_path("").is_err());
        assert!(validate_path(".user").is_err());
        assert!(validate_path("user.").is_err());
        assert!(validate_path("user..get").is_err());
        assert!(validate_path("user/get").is_err());
        assert!(validate_path("user get").is_err());
        assert!(validate_path("1user.get").is_err());
        assert!(validate_path("user.\tget").is_err());
    }

    #[test]
    fn normalized_input_is_returned_unchanged() {
        let p = validate_path("user.get").unwrap();
        assert_eq!(p.as_str(), "user.get");
        assert_eq!(p.segments().collect::<Vec<_>>(), vec!["user", "get"]);
    }

    proptest::proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(s in ".{0,64}") {
            let _ = validate_path(&s);
        }
    }
}
