use crate::config::version::validate_requirement;
use crate::patches::{self, MODULE_NAMES};
use serde::Deserialize;
use std::fmt;

pub const DEFAULT_BUNDLE: &str = "out/extension.js";
pub const DEFAULT_ASSETS_DIR: &str = "common-webviews/assets";

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PatcherConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub memories: MemoriesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl PatcherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if let Some(range) = &self.meta.version_range {
            if let Err(error) = validate_requirement(range) {
                issues.push(ValidationIssue::InvalidVersionRange {
                    value: range.clone(),
                    message: error.to_string(),
                });
            }
        }

        if self.memories.default_upper_bound_size == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "memories.default_upper_bound_size",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.pipeline.bundle.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "pipeline.bundle",
            });
        }
        if self.pipeline.assets_dir.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "pipeline.assets_dir",
            });
        }

        for name in &self.pipeline.modules {
            if !MODULE_NAMES.contains(&name.as_str()) {
                issues.push(ValidationIssue::UnknownModule {
                    name: name.clone(),
                    suggestion: patches::suggest(name),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement the extension's `package.json` version must satisfy.
    #[serde(default)]
    pub version_range: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemoriesConfig {
    #[serde(default = "default_upper_bound_size")]
    pub default_upper_bound_size: u64,
}

impl Default for MemoriesConfig {
    fn default() -> Self {
        Self {
            default_upper_bound_size: default_upper_bound_size(),
        }
    }
}

fn default_upper_bound_size() -> u64 {
    patches::memories::DEFAULT_UPPER_BOUND_SIZE
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bundle path, relative to the extension directory.
    #[serde(default = "default_bundle")]
    pub bundle: String,
    /// Webview assets directory, relative to the extension directory.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    /// Modules to run; empty means all of them.
    #[serde(default)]
    pub modules: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bundle: default_bundle(),
            assets_dir: default_assets_dir(),
            modules: Vec::new(),
        }
    }
}

fn default_bundle() -> String {
    DEFAULT_BUNDLE.to_string()
}

fn default_assets_dir() -> String {
    DEFAULT_ASSETS_DIR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.len() == 1 {
            return write!(f, "{}", self.issues[0]);
        }

        writeln!(f, "{} validation issues:", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "- {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
    InvalidVersionRange {
        value: String,
        message: String,
    },
    UnknownModule {
        name: String,
        suggestion: Option<&'static str>,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => write!(f, "missing field '{field}'"),
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid value for '{field}': {message}")
            }
            ValidationIssue::InvalidVersionRange { value, message } => {
                write!(f, "invalid meta.version_range '{value}': {message}")
            }
            ValidationIssue::UnknownModule { name, suggestion } => match suggestion {
                Some(s) => write!(f, "unknown patch module '{name}' (did you mean '{s}'?)"),
                None => write!(f, "unknown patch module '{name}'"),
            },
        }
    }
}
