//! Marker guard: per-module idempotency tokens stamped into the artifact.
//!
//! A marker is appended as a trailing block comment, which has no effect on
//! the artifact's executable semantics. A module whose marker is present is
//! treated as already applied and performs no edits.

/// Whether `marker` is already stamped into `text`.
pub fn has_marker(text: &str, marker: &str) -> bool {
    text.contains(marker)
}

/// Append `marker` to `text` unless it is already present.
pub fn ensure_marker(text: &str, marker: &str) -> String {
    if has_marker(text, marker) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + marker.len() + 6);
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("/*");
    out.push_str(marker);
    out.push_str("*/\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "__test_marker_v1";

    #[test]
    fn test_ensure_marker_appends_comment() {
        let out = ensure_marker("let a=1;", MARKER);
        assert_eq!(out, "let a=1;\n/*__test_marker_v1*/\n");
        assert!(has_marker(&out, MARKER));
    }

    #[test]
    fn test_ensure_marker_is_idempotent() {
        let once = ensure_marker("let a=1;\n", MARKER);
        let twice = ensure_marker(&once, MARKER);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(MARKER).count(), 1);
    }

    #[test]
    fn test_markers_of_other_modules_accumulate() {
        let out = ensure_marker(&ensure_marker("x", "__a_v1"), "__b_v1");
        assert!(has_marker(&out, "__a_v1"));
        assert!(has_marker(&out, "__b_v1"));
    }
}
