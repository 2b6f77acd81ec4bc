//! Pipeline driver: run modules against an extension and aggregate outcomes.
//!
//! Modules run strictly one after another. Each re-reads the file the previous
//! one wrote, so running several modules on one bundle is safe. The first
//! fatal error stops the whole run; files already written by earlier modules
//! keep their atomic writes.

use crate::config::{matches_requirement, PatcherConfig, VersionError};
use crate::error::PatchError;
use crate::marker::has_marker;
use crate::module::{patch_file, ApplyOptions, PatchModule, PatchOutcome, Target};
use crate::patches;
use crate::safety::ExtensionGuard;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Suffix of webview asset candidates.
pub const ASSET_SUFFIX: &str = ".js";

/// Outcomes of every module that ran against one file, in run order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcomes: Vec<PatchOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Whether any module changed any file.
    pub changed: bool,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl PipelineReport {
    fn record(&mut self, outcome: PatchOutcome) {
        self.changed |= outcome.changed;
        match self.files.iter_mut().find(|f| f.path == outcome.file) {
            Some(file) => file.outcomes.push(outcome),
            None => self.files.push(FileReport {
                path: outcome.file.clone(),
                outcomes: vec![outcome],
            }),
        }
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &PatchOutcome> {
        self.files.iter().flat_map(|f| f.outcomes.iter())
    }
}

/// Whether a module's marker is present in a file, without modifying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerStatus {
    pub module: &'static str,
    pub file: PathBuf,
    pub applied: bool,
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

pub struct Pipeline {
    modules: Vec<Box<dyn PatchModule>>,
    options: ApplyOptions,
    bundle: PathBuf,
    assets_dir: PathBuf,
    version_range: Option<String>,
}

impl Pipeline {
    /// Pipeline over explicit modules, with the default extension layout.
    pub fn new(modules: Vec<Box<dyn PatchModule>>, options: ApplyOptions) -> Self {
        let defaults = PatcherConfig::default();
        Self {
            modules,
            options,
            bundle: PathBuf::from(defaults.pipeline.bundle),
            assets_dir: PathBuf::from(defaults.pipeline.assets_dir),
            version_range: None,
        }
    }

    /// Pipeline over the modules and layout a config selects.
    pub fn from_config(config: &PatcherConfig, options: ApplyOptions) -> Result<Self, PatchError> {
        Ok(Self {
            modules: patches::build_selected(&config.pipeline.modules, config)?,
            options,
            bundle: PathBuf::from(&config.pipeline.bundle),
            assets_dir: PathBuf::from(&config.pipeline.assets_dir),
            version_range: config.meta.version_range.clone(),
        })
    }

    pub fn modules(&self) -> &[Box<dyn PatchModule>] {
        &self.modules
    }

    /// Run every bundle module against `path` in order.
    pub fn run_file(&self, path: &Path) -> Result<FileReport, PatchError> {
        let mut report = FileReport {
            path: path.to_path_buf(),
            outcomes: Vec::new(),
        };
        for module in self.bundle_modules() {
            report.outcomes.push(patch_file(module, path, self.options)?);
        }
        Ok(report)
    }

    /// Run every module against the extension at `dir`: bundle modules on the
    /// bundle, asset modules on each asset matching their prefix.
    pub fn run_extension(&self, dir: &Path) -> Result<PipelineReport, PatchError> {
        let guard = ExtensionGuard::new(dir)?;
        self.check_version(guard.extension_root())?;

        let mut report = PipelineReport {
            dry_run: self.options.dry_run,
            ..PipelineReport::default()
        };
        for (module, path) in self.targets(&guard)? {
            report.record(patch_file(module, &path, self.options)?);
        }

        info!(
            extension = %guard.extension_root().display(),
            changed = report.changed,
            files = report.files.len(),
            "pipeline finished"
        );
        Ok(report)
    }

    /// Report which markers are present, touching nothing.
    pub fn status(&self, dir: &Path) -> Result<Vec<MarkerStatus>, PatchError> {
        let guard = ExtensionGuard::new(dir)?;
        self.targets(&guard)?
            .into_iter()
            .map(|(module, path)| {
                let text = fs::read_to_string(&path).map_err(|source| PatchError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(MarkerStatus {
                    module: module.name(),
                    applied: has_marker(&text, module.marker()),
                    file: path,
                })
            })
            .collect()
    }

    fn bundle_modules(&self) -> impl Iterator<Item = &dyn PatchModule> {
        self.modules
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| m.target() == Target::Bundle)
    }

    /// Every (module, file) pair to run, in module order. Resolution failures
    /// are attributed to the module that needed the file.
    fn targets<'p>(
        &'p self,
        guard: &ExtensionGuard,
    ) -> Result<Vec<(&'p dyn PatchModule, PathBuf)>, PatchError> {
        let root = guard.extension_root();
        let mut targets = Vec::new();

        for module in &self.modules {
            let module = module.as_ref();
            let files = match module.target() {
                Target::Bundle => {
                    let bundle = root.join(&self.bundle);
                    if !bundle.is_file() {
                        return Err(PatchError::MissingFile(bundle).in_module(module.name()));
                    }
                    vec![bundle]
                }
                Target::WebviewAsset { prefix } => {
                    discover_candidates(&root.join(&self.assets_dir), prefix, ASSET_SUFFIX)
                        .map_err(|e| e.in_module(module.name()))?
                }
            };

            for file in files {
                let file = guard
                    .validate_path(&file)
                    .map_err(|e| PatchError::from(e).in_module(module.name()))?;
                targets.push((module, file));
            }
        }

        Ok(targets)
    }

    fn check_version(&self, root: &Path) -> Result<(), PatchError> {
        let Some(required) = self.version_range.as_deref() else {
            return Ok(());
        };

        let manifest_path = root.join("package.json");
        let raw = match fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %manifest_path.display(), "package.json missing, skipping version check");
                return Ok(());
            }
            Err(source) => {
                return Err(PatchError::Io {
                    path: manifest_path,
                    source,
                })
            }
        };

        let manifest: PackageManifest =
            serde_json::from_str(&raw).map_err(|source| PatchError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;
        let Some(found) = manifest.version else {
            warn!(path = %manifest_path.display(), "package.json has no version, skipping version check");
            return Ok(());
        };

        match matches_requirement(&found, Some(required)) {
            Ok(true) => {
                debug!(version = %found, required, "extension version accepted");
                Ok(())
            }
            Ok(false) | Err(VersionError::InvalidVersion { .. }) => {
                Err(PatchError::UnsupportedVersion {
                    found,
                    required: required.to_string(),
                })
            }
            Err(error) => Err(PatchError::UnsupportedVersion {
                found,
                required: error.to_string(),
            }),
        }
    }
}

/// Files directly in `dir` named `<prefix>*<suffix>`, sorted by name.
///
/// Symlinks are followed; the caller's [`ExtensionGuard`] rejects any that
/// leave the extension. A matching entry that cannot be read (a dangling
/// link, a permission error) is an error, never skipped.
pub fn discover_candidates(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>, PatchError> {
    if !dir.is_dir() {
        return Err(PatchError::AssetsDirMissing(dir.to_path_buf()));
    }

    let is_candidate = |name: &str| name.starts_with(prefix) && name.ends_with(suffix);
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                let Some(path) = error.path().map(Path::to_path_buf) else {
                    return Err(PatchError::Io {
                        path: dir.to_path_buf(),
                        source: error.into(),
                    });
                };
                let matches = path
                    .file_name()
                    .is_some_and(|name| is_candidate(&name.to_string_lossy()));
                if !matches {
                    debug!(path = %path.display(), %error, "skipping unreadable non-candidate entry");
                    continue;
                }
                let source: std::io::Error = error.into();
                return Err(if source.kind() == std::io::ErrorKind::NotFound {
                    PatchError::MissingFile(path)
                } else {
                    PatchError::Io { path, source }
                });
            }
        };

        if entry.file_type().is_file() && is_candidate(&entry.file_name().to_string_lossy()) {
            candidates.push(entry.into_path());
        }
    }
    candidates.sort();

    if candidates.is_empty() {
        return Err(PatchError::NoCandidates {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            dir: dir.to_path_buf(),
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_candidates_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "AugmentMessage-b.js",
            "AugmentMessage-a.js",
            "AugmentMessage-a.js.map",
            "Other-a.js",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("AugmentMessage-dir.js")).unwrap();

        let found = discover_candidates(dir.path(), "AugmentMessage-", ".js").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["AugmentMessage-a.js", "AugmentMessage-b.js"]);
    }

    #[test]
    fn test_discover_candidates_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = discover_candidates(&dir.path().join("nope"), "A-", ".js").unwrap_err();
        assert!(matches!(missing, PatchError::AssetsDirMissing(_)));

        let none = discover_candidates(dir.path(), "A-", ".js").unwrap_err();
        assert!(none.is_drift());
        assert!(none.to_string().contains("A-*.js asset not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_candidate_link_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("AugmentMessage-a.js"), "x").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("gone.js"),
            dir.path().join("AugmentMessage-b.js"),
        )
        .unwrap();

        let err = discover_candidates(dir.path(), "AugmentMessage-", ".js").unwrap_err();
        assert!(
            matches!(err, PatchError::MissingFile(ref path) if path.ends_with("AugmentMessage-b.js")),
            "{err}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_unrelated_link_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("AugmentMessage-a.js"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.js"), dir.path().join("index-b.js")).unwrap();

        let found = discover_candidates(dir.path(), "AugmentMessage-", ".js").unwrap();
        assert_eq!(found, [dir.path().join("AugmentMessage-a.js")]);
    }

    #[test]
    fn test_report_groups_by_file() {
        let outcome = |module, file: &str, changed| PatchOutcome {
            module,
            file: PathBuf::from(file),
            changed,
            reason: if changed {
                crate::module::Reason::Patched
            } else {
                crate::module::Reason::AlreadyPatched
            },
            details: Default::default(),
            preview: None,
        };

        let mut report = PipelineReport::default();
        report.record(outcome("a", "bundle.js", false));
        report.record(outcome("b", "bundle.js", true));
        report.record(outcome("c", "asset.js", false));

        assert!(report.changed);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].outcomes.len(), 2);
        assert_eq!(report.outcomes().count(), 3);
    }
}
