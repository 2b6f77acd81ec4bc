//! Structural injectors: insert generated code at the start of located bodies.

use crate::anchor::{match_literal_unique, RegexAnchor};
use crate::edit::{apply_splices, Splice};
use crate::error::PatchError;
use tracing::debug;

/// Result of injecting into callable bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injected {
    pub text: String,
    /// Occurrences actually patched (builders may decline some).
    pub count: usize,
}

/// Split a raw parameter list into bare names, dropping default values.
///
/// `t,r,n,i="POST",o` becomes `["t", "r", "n", "i", "o"]`.
pub fn parse_param_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|param| param.split('=').next().unwrap_or_default().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inject code immediately after the opening brace of every
/// `async <callable>(<params>)` in `text`.
///
/// `build` receives the positional parameter names of each occurrence and
/// returns `None` when the injection does not apply there (e.g. arity too
/// low); such occurrences are skipped without failing. At least one signature
/// must exist.
pub fn inject_into_callable_bodies<F>(
    text: &str,
    callable: &str,
    mut build: F,
) -> Result<Injected, PatchError>
where
    F: FnMut(&[String]) -> Option<String>,
{
    let pattern = format!(r"async\s+{}\s*\((?P<params>[^)]*)\)", regex::escape(callable));
    let anchor = RegexAnchor::new(&pattern, callable)?;
    let signatures = anchor.find_all(text);
    if signatures.is_empty() {
        return Err(PatchError::AnchorNotFound {
            label: callable.to_string(),
        });
    }

    // Every span is computed against the same snapshot; apply_splices
    // applies them highest offset first.
    let mut splices = Vec::new();
    for signature in &signatures {
        let after_signature = signature.span().end;
        let open_brace = text[after_signature..]
            .find('{')
            .map(|offset| after_signature + offset)
            .ok_or_else(|| PatchError::BodyOpenerNotFound {
                callable: callable.to_string(),
            })?;

        let raw_params = signature.get("params").unwrap_or_default();
        let params = parse_param_names(raw_params);
        if let Some(injection) = build(&params).filter(|code| !code.is_empty()) {
            splices.push(Splice::insert(open_brace + 1, injection));
        }
    }

    let count = splices.len();
    debug!(
        callable,
        signatures = signatures.len(),
        patched = count,
        "structural injection"
    );
    Ok(Injected {
        text: apply_splices(text, splices)?,
        count,
    })
}

/// Insert `injection` right after the unique occurrence of `needle`.
pub fn inject_once_after_literal(
    text: &str,
    needle: &str,
    injection: &str,
    label: &str,
) -> Result<String, PatchError> {
    let span = match_literal_unique(text, needle, label)?;
    Ok(apply_splices(text, vec![Splice::insert(span.end, injection)])?)
}
