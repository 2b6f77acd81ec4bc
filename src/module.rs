//! Patch module contract: one idempotent, self-contained behavioral change.
//!
//! A module transforms one snapshot of the artifact through an ordered
//! sequence of anchor/rewrite steps. The marker check happens before any
//! side effect, and the write-back happens only after every step succeeded
//! in memory, so a failing module leaves the file untouched.

use crate::edit::atomic_write;
use crate::error::PatchError;
use crate::marker::{ensure_marker, has_marker};
use crate::safety::ArtifactLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which files of an extension a module targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// The main extension bundle.
    Bundle,
    /// Webview assets named `<prefix>*.js`.
    WebviewAsset { prefix: &'static str },
}

/// Text produced by a module's edit steps, before the marker is stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub text: String,
    /// Module-specific counts (occurrences patched per sub-step, options used).
    pub details: BTreeMap<&'static str, u64>,
}

impl Transformed {
    pub fn new(text: String) -> Self {
        Self {
            text,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &'static str, value: u64) -> Self {
        self.details.insert(key, value);
        self
    }
}

/// One independent behavioral change to the artifact.
pub trait PatchModule {
    /// Stable kebab-case identifier.
    fn name(&self) -> &'static str;

    /// Idempotency token stamped once the module applied.
    fn marker(&self) -> &'static str;

    fn target(&self) -> Target;

    /// Run every edit step against `text`. Must be pure and deterministic.
    fn transform(&self, text: &str) -> Result<Transformed, PatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    AlreadyPatched,
    Patched,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::AlreadyPatched => write!(f, "already_patched"),
            Reason::Patched => write!(f, "patched"),
        }
    }
}

/// Outcome of running a module on text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "TextPatch carries the rewritten text"]
pub struct TextPatch {
    /// `None` when the marker was already present.
    pub text: Option<String>,
    pub details: BTreeMap<&'static str, u64>,
}

impl TextPatch {
    pub fn reason(&self) -> Reason {
        if self.text.is_some() {
            Reason::Patched
        } else {
            Reason::AlreadyPatched
        }
    }
}

/// Before/after text of a file, kept only when requested (for diffs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub before: String,
    pub after: String,
}

/// Structured result of one module invocation against one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub module: &'static str,
    pub file: PathBuf,
    pub changed: bool,
    pub reason: Reason,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<&'static str, u64>,
    #[serde(skip)]
    pub preview: Option<Preview>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Compute everything, write nothing.
    pub dry_run: bool,
    /// Keep before/after text in the outcome.
    pub preview: bool,
}

/// Run `module` against an in-memory artifact.
pub fn patch_text(module: &dyn PatchModule, text: &str) -> Result<TextPatch, PatchError> {
    if has_marker(text, module.marker()) {
        return Ok(TextPatch {
            text: None,
            details: BTreeMap::new(),
        });
    }

    let transformed = module.transform(text)?;
    Ok(TextPatch {
        text: Some(ensure_marker(&transformed.text, module.marker())),
        details: transformed.details,
    })
}

/// Run `module` against the artifact at `path`: read, transform, stamp, write.
///
/// Errors are attributed to the module. On error nothing is written.
pub fn patch_file(
    module: &dyn PatchModule,
    path: &Path,
    options: ApplyOptions,
) -> Result<PatchOutcome, PatchError> {
    run_on_file(module, path, options).map_err(|e| e.in_module(module.name()))
}

fn run_on_file(
    module: &dyn PatchModule,
    path: &Path,
    options: ApplyOptions,
) -> Result<PatchOutcome, PatchError> {
    if !path.is_file() {
        return Err(PatchError::MissingFile(path.to_path_buf()));
    }

    // A dry run writes nothing, not even the lock file.
    let _lock = if options.dry_run {
        None
    } else {
        Some(ArtifactLock::acquire(path)?)
    };

    let original = fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let patch = patch_text(module, &original)?;
    let reason = patch.reason();

    if let Some(next) = &patch.text {
        if !options.dry_run {
            atomic_write(path, next.as_bytes()).map_err(|source| PatchError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    info!(
        module = module.name(),
        file = %path.display(),
        %reason,
        dry_run = options.dry_run,
        "patch module finished"
    );

    let preview = match (&patch.text, options.preview) {
        (Some(after), true) => Some(Preview {
            before: original,
            after: after.clone(),
        }),
        _ => None,
    };

    Ok(PatchOutcome {
        module: module.name(),
        file: path.to_path_buf(),
        changed: patch.text.is_some(),
        reason,
        details: patch.details,
        preview,
    })
}
