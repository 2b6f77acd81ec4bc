use crate::config::schema::{PatcherConfig, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config file picked up from the extension directory when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "artifact-patcher.toml";

/// Where a config problem was found, for error messages.
fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read patcher config from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse patcher config TOML{}: {source}", origin(path))]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid patcher config{}: {source}", origin(path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },
}

impl ConfigError {
    /// Attach the file the config came from, if not already known.
    fn at(self, file: &Path) -> Self {
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(file.to_path_buf()),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatcherConfig, ConfigError> {
    let config: PatcherConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatcherConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.at(path))
}

/// Resolve the config for an extension: the explicit file if given, else
/// [`CONFIG_FILE_NAME`] inside `extension_dir` if present, else defaults.
pub fn load_for_extension(
    explicit: Option<&Path>,
    extension_dir: &Path,
) -> Result<PatcherConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    let local = extension_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        debug!(path = %local.display(), "using extension-local patcher config");
        return load_from_path(local);
    }

    Ok(PatcherConfig::default())
}
