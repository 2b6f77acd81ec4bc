pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{load_for_extension, load_from_path, load_from_str, ConfigError, CONFIG_FILE_NAME};
pub use schema::{
    MemoriesConfig, Metadata, PatcherConfig, PipelineConfig, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, VersionError};
