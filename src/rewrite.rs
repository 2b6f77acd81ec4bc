//! Capture-driven rewriters.
//!
//! A rewriter receives the captures of a successful anchor match and
//! synthesizes replacement text that references whatever identifiers the
//! artifact happened to bind in this revision. Captures are validated before
//! use: an empty identifier is fatal, never interpolated.

use crate::anchor::Span;
use crate::edit::{apply_splices, Splice};
use crate::error::PatchError;
use regex::Captures;

/// Captures of one anchor match, labeled with the anchor that produced them.
#[derive(Debug)]
pub struct CaptureSet<'t> {
    captures: Captures<'t>,
    label: String,
}

impl<'t> CaptureSet<'t> {
    pub(crate) fn new(captures: Captures<'t>, label: &str) -> Self {
        Self {
            captures,
            label: label.to_string(),
        }
    }

    /// The full matched text.
    pub fn full(&self) -> &'t str {
        self.captures.get(0).map_or("", |m| m.as_str())
    }

    /// Byte span of the full match in the artifact.
    pub fn span(&self) -> Span {
        self.captures.get(0).map_or(Span { start: 0, end: 0 }, |m| Span {
            start: m.start(),
            end: m.end(),
        })
    }

    /// A named capture, if the group participated in the match.
    pub fn get(&self, name: &str) -> Option<&'t str> {
        self.captures.name(name).map(|m| m.as_str())
    }

    /// A named capture, which must be present and non-empty.
    pub fn require(&self, name: &str) -> Result<&'t str, PatchError> {
        match self.captures.name(name) {
            Some(m) if !m.as_str().is_empty() => Ok(m.as_str()),
            _ => Err(PatchError::CaptureMissing {
                label: self.label.clone(),
                capture: name.to_string(),
            }),
        }
    }

    /// Rebuild the full match with the named group's span replaced.
    pub fn splice_group(&self, name: &str, replacement: &str) -> Result<String, PatchError> {
        let group = self
            .captures
            .name(name)
            .filter(|m| !m.as_str().is_empty())
            .ok_or_else(|| PatchError::CaptureMissing {
                label: self.label.clone(),
                capture: name.to_string(),
            })?;
        let base = self.span().start;
        let full = self.full();
        Ok(apply_splices(
            full,
            vec![Splice::replace(
                full,
                group.start() - base,
                group.end() - base,
                replacement,
            )],
        )?)
    }

    /// Rebuild the full match with the first occurrence of `old_tail` replaced.
    ///
    /// Lets a rewriter target a narrow sub-region of a broad anchor. A missing
    /// tail is its own fatal error, distinct from the anchor failing.
    pub fn replace_tail(&self, old_tail: &str, new_tail: &str) -> Result<String, PatchError> {
        let full = self.full();
        let start = full.find(old_tail).ok_or_else(|| PatchError::TailNotFound {
            label: self.label.clone(),
        })?;
        Ok(apply_splices(
            full,
            vec![Splice::replace(full, start, start + old_tail.len(), new_tail)],
        )?)
    }
}
