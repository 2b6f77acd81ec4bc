//! Artifact Patcher: idempotent, fail-fast patching of opaque generated text.
//!
//! Targets a third-party bundled JavaScript artifact (an extension bundle and
//! its webview assets) whose internal names are minified and may change
//! between releases. Each patch module applies one behavioral change through
//! a chain of anchor/rewrite steps, stamps a marker, and writes the file back
//! atomically.
//!
//! # Architecture
//!
//! Every rewrite compiles down to one primitive: [`Splice`], a verified
//! byte-span replacement computed against an immutable snapshot. Intelligence
//! lives in span acquisition ([`anchor`], [`rewrite`], [`inject`]), not in
//! the application logic.
//!
//! # Safety
//!
//! - Ambiguous or missing anchors are fatal; nothing picks "the first one"
//! - A module writes only after all of its steps succeeded in memory
//! - Atomic file writes (tempfile + fsync + rename) under an advisory lock
//! - Extension-directory boundary enforcement
//! - Markers make every module idempotent
//!
//! # Example
//!
//! ```
//! use artifact_patcher::module::{patch_text, Reason};
//! use artifact_patcher::patches::MemoriesUpperBoundSize;
//!
//! let bundle = "let q=f().flags.memoriesParams.upper_bound_size;";
//! let module = MemoriesUpperBoundSize::default();
//!
//! let first = patch_text(&module, bundle).unwrap();
//! let patched = first.text.unwrap();
//! assert!(patched.contains("||10000;"));
//!
//! let second = patch_text(&module, &patched).unwrap();
//! assert_eq!(second.reason(), Reason::AlreadyPatched);
//! ```

pub mod anchor;
pub mod cache;
pub mod config;
pub mod edit;
pub mod error;
pub mod inject;
pub mod marker;
pub mod module;
pub mod patches;
pub mod pipeline;
pub mod rewrite;
pub mod safety;

pub use anchor::{Expect, RegexAnchor, Span};
pub use edit::{apply_splices, atomic_write, Splice, SpliceError, Verification};
pub use error::PatchError;
pub use module::{patch_file, patch_text, ApplyOptions, PatchModule, PatchOutcome, Reason};
pub use pipeline::{Pipeline, PipelineReport};
pub use safety::{ArtifactLock, ExtensionGuard, SafetyError};
