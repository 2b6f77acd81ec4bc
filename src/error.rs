use crate::edit::SpliceError;
use crate::safety::SafetyError;
use std::path::PathBuf;
use thiserror::Error;

/// Every fatal condition the engine can raise.
///
/// "Already patched" is deliberately absent: it is a normal outcome, not an error.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("needle not found: {label} (upstream may have changed)")]
    AnchorNotFound { label: String },

    #[error("needle matched multiple times: {label} ({count} matches, refusing to patch)")]
    AnchorAmbiguous { label: String, count: usize },

    #[error("patch failed: {label} (expected {expected} matches, found {found})")]
    CountMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("{label}: capture missing ({capture})")]
    CaptureMissing { label: String, capture: String },

    #[error("{label}: tail not found (upstream may have changed)")]
    TailNotFound { label: String },

    #[error("{callable} patch: failed to locate method body opening brace")]
    BodyOpenerNotFound { callable: String },

    #[error("invalid anchor pattern for {label}: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },

    #[error("splice failed: {0}")]
    Splice(#[from] SpliceError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("failed to parse {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact version {found} does not satisfy version_range {required}")]
    UnsupportedVersion { found: String, required: String },

    #[error("unknown patch module '{name}'{}", suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownModule {
        name: String,
        suggestion: Option<String>,
    },

    #[error("webview assets dir missing: {}", .0.display())]
    AssetsDirMissing(PathBuf),

    #[error("{prefix}*{suffix} asset not found in {} (upstream may have changed)", dir.display())]
    NoCandidates {
        prefix: String,
        suffix: String,
        dir: PathBuf,
    },

    #[error("{module}: {source}")]
    Module {
        module: &'static str,
        #[source]
        source: Box<PatchError>,
    },
}

impl PatchError {
    /// Attribute this error to a patch module, unless it already is.
    pub fn in_module(self, module: &'static str) -> Self {
        match self {
            already @ PatchError::Module { .. } => already,
            other => PatchError::Module {
                module,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through module attribution.
    pub fn root(&self) -> &PatchError {
        match self {
            PatchError::Module { source, .. } => source.root(),
            other => other,
        }
    }

    /// Errors that mean the upstream artifact drifted away from our anchors.
    pub fn is_drift(&self) -> bool {
        matches!(
            self.root(),
            PatchError::AnchorNotFound { .. }
                | PatchError::AnchorAmbiguous { .. }
                | PatchError::CountMismatch { .. }
                | PatchError::CaptureMissing { .. }
                | PatchError::TailNotFound { .. }
                | PatchError::BodyOpenerNotFound { .. }
                | PatchError::NoCandidates { .. }
        )
    }
}
