//! Default for the `remember` tool's memory size cap.
//!
//! `_setMemories()` reads `flags.memoriesParams.upper_bound_size` from the
//! feature flags. Without server-provided flags the value is missing and
//! `remember()` fails with "upper bound size missing"; the rewrite falls back
//! to a configured default.

use crate::anchor::{replace_regex_once, RegexAnchor};
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_memories_upper_bound_size_patched_v1";
pub const DEFAULT_UPPER_BOUND_SIZE: u64 = 10_000;

const UPPER_BOUND_READ: &str = r"let\s+(?P<var>[A-Za-z_$][0-9A-Za-z_$]*)=(?P<flags>[A-Za-z_$][0-9A-Za-z_$]*)\(\)\.flags\.memoriesParams\.upper_bound_size;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoriesUpperBoundSize {
    default_upper_bound_size: u64,
}

impl MemoriesUpperBoundSize {
    /// Zero falls back to [`DEFAULT_UPPER_BOUND_SIZE`].
    pub fn new(default_upper_bound_size: u64) -> Self {
        let default_upper_bound_size = if default_upper_bound_size == 0 {
            DEFAULT_UPPER_BOUND_SIZE
        } else {
            default_upper_bound_size
        };
        Self {
            default_upper_bound_size,
        }
    }
}

impl Default for MemoriesUpperBoundSize {
    fn default() -> Self {
        Self::new(DEFAULT_UPPER_BOUND_SIZE)
    }
}

impl PatchModule for MemoriesUpperBoundSize {
    fn name(&self) -> &'static str {
        "memories-upper-bound-size"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::Bundle
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let anchor = RegexAnchor::new(UPPER_BOUND_READ, "memories upper_bound_size default")?;
        let upper = self.default_upper_bound_size;

        let next = replace_regex_once(text, &anchor, |caps| {
            let var = caps.require("var")?;
            let flags = caps.require("flags")?;
            Ok(format!(
                "let __byok_memoriesParams={flags}().flags.memoriesParams;\
                 let {var}=(__byok_memoriesParams&&__byok_memoriesParams.upper_bound_size)||{upper};"
            ))
        })?;

        Ok(Transformed::new(next).with_detail("default_upper_bound_size", upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{patch_text, Reason};

    #[test]
    fn test_rewrites_with_captured_names() {
        let input = "function s(){let q=f().flags.memoriesParams.upper_bound_size;if(!q)throw e}";
        let patch = patch_text(&MemoriesUpperBoundSize::default(), input).unwrap();
        let out = patch.text.unwrap();

        assert!(out.contains("let __byok_memoriesParams=f().flags.memoriesParams;"));
        assert!(out.contains(
            "let q=(__byok_memoriesParams&&__byok_memoriesParams.upper_bound_size)||10000;if(!q)"
        ));
        assert!(out.contains(MARKER));
        assert_eq!(patch.details.get("default_upper_bound_size"), Some(&10_000));

        let again = patch_text(&MemoriesUpperBoundSize::default(), &out).unwrap();
        assert_eq!(again.reason(), Reason::AlreadyPatched);
    }

    #[test]
    fn test_custom_default_and_zero_fallback() {
        let input = "let $v=_g().flags.memoriesParams.upper_bound_size;";
        let out = MemoriesUpperBoundSize::new(512).transform(input).unwrap();
        assert!(out.text.ends_with("let $v=(__byok_memoriesParams&&__byok_memoriesParams.upper_bound_size)||512;"));

        assert_eq!(MemoriesUpperBoundSize::new(0), MemoriesUpperBoundSize::default());
    }

    #[test]
    fn test_missing_anchor_is_fatal() {
        let err = MemoriesUpperBoundSize::default()
            .transform("let q=f().flags.memoriesParams.lower_bound_size;")
            .unwrap_err();
        assert!(matches!(err, PatchError::AnchorNotFound { .. }));
        assert!(err.to_string().contains("memories upper_bound_size default"));
    }
}
