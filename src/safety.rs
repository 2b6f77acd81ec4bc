use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Boundary checks keeping every patched file inside the extension directory.
#[derive(Debug, Clone)]
pub struct ExtensionGuard {
    /// Canonical path to the extension root
    extension_root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("invalid extension dir: {}", .0.display())]
    InvalidExtensionDir(PathBuf),

    #[error("path is outside extension dir: {} (extension: {})", path.display(), extension.display())]
    OutsideExtension { path: PathBuf, extension: PathBuf },

    #[error("artifact is locked by another patch run: {}", .0.display())]
    Locked(PathBuf),

    #[error("failed to resolve {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtensionGuard {
    /// Create a guard for `extension_root`, which must exist and must not be
    /// the filesystem root.
    pub fn new(extension_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let requested = extension_root.as_ref();
        let extension_root = requested.canonicalize().map_err(|source| SafetyError::Resolve {
            path: requested.to_path_buf(),
            source,
        })?;

        if extension_root.parent().is_none() || !extension_root.is_dir() {
            return Err(SafetyError::InvalidExtensionDir(extension_root));
        }

        Ok(Self { extension_root })
    }

    /// Check that `path` resolves inside the extension directory.
    ///
    /// Returns the canonical path. Symlinks pointing outside are rejected.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.extension_root.join(path)
        };

        let canonical = absolute.canonicalize().map_err(|source| SafetyError::Resolve {
            path: absolute.clone(),
            source,
        })?;

        if !canonical.starts_with(&self.extension_root) {
            return Err(SafetyError::OutsideExtension {
                path: canonical,
                extension: self.extension_root.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn extension_root(&self) -> &Path {
        &self.extension_root
    }
}

/// Advisory exclusive lock held for one read-transform-write cycle.
///
/// The lock lives on a sibling `.<name>.patch-lock` file rather than on the
/// artifact itself, since the artifact's inode is replaced by the atomic
/// rename. The lock file is left in place after release. A concurrent run
/// fails fast with [`SafetyError::Locked`].
#[derive(Debug)]
pub struct ArtifactLock {
    file: File,
    path: PathBuf,
}

impl ArtifactLock {
    pub fn acquire(artifact: &Path) -> Result<Self, SafetyError> {
        let path = lock_path_for(artifact);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| SafetyError::Resolve {
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive().map_err(|source| {
            if source.kind() == fs2::lock_contended_error().kind() {
                SafetyError::Locked(artifact.to_path_buf())
            } else {
                SafetyError::Resolve {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        debug!(lock = %path.display(), "artifact lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        // The file stays: unlinking it would let a waiter lock an orphaned
        // inode while a newcomer locks a fresh one.
        let _ = self.file.unlock();
        debug!(lock = %self.path.display(), "artifact lock released");
    }
}

fn lock_path_for(artifact: &Path) -> PathBuf {
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    artifact.with_file_name(format!(".{name}.patch-lock"))
}
