//! Upstream version gating with semver requirements.
//!
//! Anchors are written against a particular range of extension releases.
//! A config can pin that range (`">=0.500.0, <0.700.0"`) and the driver
//! refuses to patch an extension whose `package.json` version falls outside.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The extension reported a version that is not semver.
    InvalidVersion { value: String, source: String },
    /// The configured range does not parse.
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid extension version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a requirement string, rejecting malformed ranges up front.
pub fn validate_requirement(requirement: &str) -> Result<VersionReq, VersionError> {
    VersionReq::parse(requirement.trim()).map_err(|e| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        source: e.to_string(),
    })
}

/// Whether `version` satisfies `requirement`. No requirement, or a blank
/// one, admits every version.
///
/// ```
/// use artifact_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("0.612.1", Some(">=0.500.0")).unwrap());
/// assert!(!matches_requirement("0.499.9", Some(">=0.500.0")).unwrap());
/// assert!(matches_requirement("0.1.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(requirement) = requirement.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(true);
    };

    let req = validate_requirement(requirement)?;
    let version = Version::parse(version.trim()).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}
