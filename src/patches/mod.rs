//! The patch modules shipped with the patcher, and their registry.
//!
//! Bundle modules run in the order of [`MODULE_NAMES`]; each one re-reads the
//! artifact the previous one wrote.

pub mod memories;
pub mod official;
pub mod tasklist_errors;
pub mod tasklist_root;
pub mod tasklist_sanitize;
pub mod webview_history;
pub mod webview_tool_use;

pub use memories::MemoriesUpperBoundSize;
pub use official::OfficialOverrides;
pub use tasklist_errors::TasklistAddTasksErrors;
pub use tasklist_root::TasklistAutoRoot;
pub use tasklist_sanitize::TasklistSanitizeEmptyIds;
pub use webview_history::WebviewHistorySummaryNode;
pub use webview_tool_use::WebviewToolUseFallback;

use crate::config::PatcherConfig;
use crate::error::PatchError;
use crate::module::PatchModule;

/// Identifier in the minified bundle.
macro_rules! js_ident {
    () => {
        r"[A-Za-z_$][\w$]*"
    };
}
pub(crate) use js_ident;

/// Every module in canonical application order.
pub const MODULE_NAMES: [&str; 7] = [
    "official-overrides",
    "memories-upper-bound-size",
    "tasklist-auto-root",
    "tasklist-add-tasks-sanitize-empty-ids",
    "tasklist-add-tasks-errors",
    "webview-tooluse-fallback",
    "webview-history-summary-node",
];

/// Instantiate the module registered under `name`.
pub fn build(name: &str, config: &PatcherConfig) -> Result<Box<dyn PatchModule>, PatchError> {
    let module: Box<dyn PatchModule> = match name {
        "official-overrides" => Box::new(OfficialOverrides),
        "memories-upper-bound-size" => Box::new(MemoriesUpperBoundSize::new(
            config.memories.default_upper_bound_size,
        )),
        "tasklist-auto-root" => Box::new(TasklistAutoRoot),
        "tasklist-add-tasks-sanitize-empty-ids" => Box::new(TasklistSanitizeEmptyIds),
        "tasklist-add-tasks-errors" => Box::new(TasklistAddTasksErrors),
        "webview-tooluse-fallback" => Box::new(WebviewToolUseFallback),
        "webview-history-summary-node" => Box::new(WebviewHistorySummaryNode),
        _ => {
            return Err(PatchError::UnknownModule {
                name: name.to_string(),
                suggestion: suggest(name).map(str::to_string),
            })
        }
    };
    Ok(module)
}

/// Instantiate the modules named in `selection`, or all of them when empty,
/// always in canonical order.
pub fn build_selected(
    selection: &[String],
    config: &PatcherConfig,
) -> Result<Vec<Box<dyn PatchModule>>, PatchError> {
    for name in selection {
        if !MODULE_NAMES.contains(&name.as_str()) {
            return Err(PatchError::UnknownModule {
                name: name.clone(),
                suggestion: suggest(name).map(str::to_string),
            });
        }
    }

    MODULE_NAMES
        .iter()
        .filter(|name| selection.is_empty() || selection.iter().any(|s| s == *name))
        .map(|name| build(name, config))
        .collect()
}

/// Closest registered module name, if any is reasonably close.
pub fn suggest(name: &str) -> Option<&'static str> {
    MODULE_NAMES
        .iter()
        .map(|candidate| (*candidate, strsim::jaro_winkler(name, candidate)))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}
