//! Anchor matchers: locate the text region a transformation applies to.
//!
//! Three disciplines are supported, each fatal on violation:
//!
//! - literal needles that must occur exactly once
//! - regular expressions that must match exactly once
//! - regular expressions replaced everywhere with an asserted occurrence count
//!
//! Ambiguity is always a broken assumption about the artifact, never a reason
//! to pick "the first one". Every matcher carries a label naming the logical
//! transformation so drift is diagnosable from the error alone.

use crate::cache;
use crate::edit::{apply_splices, Splice};
use crate::error::PatchError;
use crate::rewrite::CaptureSet;
use regex::{Captures, Regex};
use tracing::debug;

/// Byte span of a located anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Uniqueness policy for an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Exactly one occurrence; zero is "not found", more is "ambiguous".
    ExactlyOne,
    /// Exactly `n` occurrences; any other count, zero included, is fatal.
    Exactly(usize),
    /// One or more occurrences, all rewritten.
    AtLeastOne,
    /// Any number of occurrences, zero included.
    Any,
}

impl Expect {
    /// Check an occurrence count against this policy.
    pub fn check(self, found: usize, label: &str) -> Result<(), PatchError> {
        match self {
            Expect::ExactlyOne if found == 0 => Err(PatchError::AnchorNotFound {
                label: label.to_string(),
            }),
            Expect::ExactlyOne if found > 1 => Err(PatchError::AnchorAmbiguous {
                label: label.to_string(),
                count: found,
            }),
            Expect::Exactly(expected) if found != expected => Err(PatchError::CountMismatch {
                label: label.to_string(),
                expected,
                found,
            }),
            Expect::AtLeastOne if found == 0 => Err(PatchError::AnchorNotFound {
                label: label.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// A labeled regular-expression anchor.
///
/// The `regex` engine has no back-references, so patterns that must bind the
/// same identifier twice capture both sites under different names and declare
/// them with [`RegexAnchor::require_same`]. Matches violating a constraint are
/// not counted.
#[derive(Debug, Clone)]
pub struct RegexAnchor {
    regex: Regex,
    label: String,
    same: Vec<(&'static str, &'static str)>,
}

impl RegexAnchor {
    pub fn new(pattern: &str, label: impl Into<String>) -> Result<Self, PatchError> {
        let label = label.into();
        let regex = cache::get_or_compile(pattern).map_err(|source| PatchError::InvalidPattern {
            label: label.clone(),
            source,
        })?;
        Ok(Self {
            regex,
            label,
            same: Vec::new(),
        })
    }

    /// Require two named capture groups to bind identical text.
    pub fn require_same(mut self, first: &'static str, second: &'static str) -> Self {
        self.same.push((first, second));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn admits(&self, caps: &Captures<'_>) -> bool {
        self.same.iter().all(|(a, b)| match (caps.name(a), caps.name(b)) {
            (Some(a), Some(b)) => a.as_str() == b.as_str(),
            _ => false,
        })
    }

    /// All non-overlapping matches that satisfy the capture constraints.
    ///
    /// A rejected match does not consume its text: the search resumes one
    /// character past its start, so a later start inside it can still match.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<CaptureSet<'t>> {
        let mut found = Vec::new();
        let mut at = 0;

        while at <= text.len() {
            let Some(caps) = self.regex.captures_at(text, at) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };

            if self.admits(&caps) {
                at = if whole.end() > whole.start() {
                    whole.end()
                } else {
                    next_char(text, whole.end())
                };
                found.push(CaptureSet::new(caps, &self.label));
            } else {
                at = next_char(text, whole.start());
            }
        }

        found
    }
}

/// Offset just past the character starting at `offset`, or past the end.
fn next_char(text: &str, offset: usize) -> usize {
    text[offset..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| offset + c.len_utf8())
}

/// Result of a multi-occurrence rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
    pub text: String,
    pub count: usize,
}

/// Locate `needle`, which must occur exactly once.
pub fn match_literal_unique(text: &str, needle: &str, label: &str) -> Result<Span, PatchError> {
    let mut occurrences = text.match_indices(needle);
    let Some((start, _)) = occurrences.next() else {
        return Err(PatchError::AnchorNotFound {
            label: label.to_string(),
        });
    };
    if occurrences.next().is_some() {
        return Err(PatchError::AnchorAmbiguous {
            label: label.to_string(),
            count: text.matches(needle).count(), // full count only for the message
        });
    }
    debug!(label, start, "literal anchor matched");
    Ok(Span {
        start,
        end: start + needle.len(),
    })
}

/// Replace the unique occurrence of `needle` with `replacement`.
pub fn replace_literal_once(
    text: &str,
    needle: &str,
    replacement: &str,
    label: &str,
) -> Result<String, PatchError> {
    let span = match_literal_unique(text, needle, label)?;
    Ok(apply_splices(
        text,
        vec![Splice::replace(text, span.start, span.end, replacement)],
    )?)
}

/// The unique match of `anchor` in `text`.
pub fn match_regex_once<'t>(
    text: &'t str,
    anchor: &RegexAnchor,
) -> Result<CaptureSet<'t>, PatchError> {
    let mut matches = anchor.find_all(text);
    Expect::ExactlyOne.check(matches.len(), anchor.label())?;
    let only = matches.remove(0);
    debug!(label = anchor.label(), start = only.span().start, "regex anchor matched");
    Ok(only)
}

/// Rewrite the unique match of `anchor` with text synthesized from its captures.
pub fn replace_regex_once<F>(text: &str, anchor: &RegexAnchor, rewrite: F) -> Result<String, PatchError>
where
    F: FnOnce(&CaptureSet<'_>) -> Result<String, PatchError>,
{
    let caps = match_regex_once(text, anchor)?;
    let replacement = rewrite(&caps)?;
    let span = caps.span();
    Ok(apply_splices(
        text,
        vec![Splice::replace(text, span.start, span.end, replacement)],
    )?)
}

/// Replace every match of `anchor` with a literal `replacement`, asserting
/// exactly `expected` occurrences.
pub fn replace_regex_expected(
    text: &str,
    anchor: &RegexAnchor,
    replacement: &str,
    expected: usize,
) -> Result<Replaced, PatchError> {
    replace_regex_all(text, anchor, Expect::Exactly(expected), |_| {
        Ok(replacement.to_string())
    })
}

/// Rewrite every match of `anchor` under the given uniqueness policy.
///
/// All spans are computed against `text` first and applied bottom-to-top.
pub fn replace_regex_all<F>(
    text: &str,
    anchor: &RegexAnchor,
    policy: Expect,
    mut rewrite: F,
) -> Result<Replaced, PatchError>
where
    F: FnMut(&CaptureSet<'_>) -> Result<String, PatchError>,
{
    let matches = anchor.find_all(text);
    policy.check(matches.len(), anchor.label())?;

    let mut splices = Vec::with_capacity(matches.len());
    for caps in &matches {
        let span = caps.span();
        splices.push(Splice::replace(text, span.start, span.end, rewrite(caps)?));
    }

    let count = splices.len();
    debug!(label = anchor.label(), count, "regex anchor rewritten");
    Ok(Replaced {
        text: apply_splices(text, splices)?,
        count,
    })
}
