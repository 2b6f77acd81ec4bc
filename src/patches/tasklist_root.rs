//! Create the conversation's root task list on demand.
//!
//! Tasklist tools need a conversation-scoped root task list. Upstream creates
//! it lazily from webview flows, so direct tool calls can hit "No root task
//! found." Each root lookup is rewritten to create the list when a
//! conversation id is available.

use super::js_ident;
use crate::anchor::{replace_regex_once, RegexAnchor};
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_tasklist_auto_root_patched_v1";

const VIEW_TASKLIST: &str = concat!(
    r"async call\((?:",
    js_ident!(),
    r",){5}(?P<conv>",
    js_ident!(),
    r")\)\{try\{(?P<lookup>let\s+(?P<root>",
    js_ident!(),
    r")=this\._taskManager\.getRootTaskUuid\((?P<conv_ref>",
    js_ident!(),
    r")\);if\(!(?P<root_ref>",
    js_ident!(),
    r#")\)return it\("No root task found\."\);)"#,
);

const BATCH_UPDATE: &str = concat!(
    r"async handleBatchUpdate\((?P<conv>",
    js_ident!(),
    r"),(?P<input>",
    js_ident!(),
    r")\)\{let\s+(?P<root>",
    js_ident!(),
    r")=this\._taskManager\.getRootTaskUuid\((?P<conv_ref>",
    js_ident!(),
    r")\);if\(!(?P<root_ref>",
    js_ident!(),
    r#")\)return it\("No root task found\."\);"#,
);

const BATCH_CREATION: &str = concat!(
    r"async handleBatchCreation\((?P<conv>",
    js_ident!(),
    r"),(?P<input>",
    js_ident!(),
    r")\)\{let\s+(?P<root>",
    js_ident!(),
    r")=this\._taskManager\.getRootTaskUuid\((?P<conv_ref>",
    js_ident!(),
    r")\);if\(!(?P<root_ref>",
    js_ident!(),
    r#")\)return it\("No root task found\."\);"#,
);

const REORGANIZE: &str = concat!(
    r"let\s+(?P<markdown>",
    js_ident!(),
    r")=r\.markdown;if\(!(?P<markdown_ref>",
    js_ident!(),
    r#")\)return it\("No markdown provided\."\);let\s+(?P<root>"#,
    js_ident!(),
    r")=this\._taskManager\.getRootTaskUuid\((?P<conv>",
    js_ident!(),
    r")\);if\(!(?P<root_ref>",
    js_ident!(),
    r#")\)return it\("No root task found\."\);"#,
);

/// Root lookup that creates the task list when it is missing.
fn ensure_root(root: &str, conv: &str) -> String {
    format!(
        "let {root}=this._taskManager.getRootTaskUuid({conv});\
         if(!{root}&&{conv}&&typeof this._taskManager.createNewTaskList===\"function\"){{{root}=await this._taskManager.createNewTaskList({conv});}}\
         if(!{root})return it(\"No root task found.\");"
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TasklistAutoRoot;

impl TasklistAutoRoot {
    fn view_tasklist(text: &str) -> Result<String, PatchError> {
        let anchor = RegexAnchor::new(VIEW_TASKLIST, "tasklist auto root: view_tasklist")?
            .require_same("conv", "conv_ref")
            .require_same("root", "root_ref");
        replace_regex_once(text, &anchor, |caps| {
            let conv = caps.require("conv")?;
            let root = caps.require("root")?;
            caps.splice_group("lookup", &ensure_root(root, conv))
        })
    }

    fn batch_handler(text: &str, method: &str, pattern: &str, label: &str) -> Result<String, PatchError> {
        let anchor = RegexAnchor::new(pattern, label)?
            .require_same("conv", "conv_ref")
            .require_same("root", "root_ref");
        replace_regex_once(text, &anchor, |caps| {
            let conv = caps.require("conv")?;
            let input = caps.require("input")?;
            let root = caps.require("root")?;
            Ok(format!(
                "async {method}({conv},{input}){{{}",
                ensure_root(root, conv)
            ))
        })
    }

    fn reorganize(text: &str) -> Result<String, PatchError> {
        let anchor = RegexAnchor::new(REORGANIZE, "tasklist auto root: reorganize_tasklist")?
            .require_same("markdown", "markdown_ref")
            .require_same("root", "root_ref");
        replace_regex_once(text, &anchor, |caps| {
            let markdown = caps.require("markdown")?;
            let root = caps.require("root")?;
            let conv = caps.require("conv")?;
            Ok(format!(
                "let {markdown}=r.markdown;if(!{markdown})return it(\"No markdown provided.\");{}",
                ensure_root(root, conv)
            ))
        })
    }
}

impl PatchModule for TasklistAutoRoot {
    fn name(&self) -> &'static str {
        "tasklist-auto-root"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::Bundle
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let next = Self::view_tasklist(text)?;
        let next = Self::batch_handler(
            &next,
            "handleBatchUpdate",
            BATCH_UPDATE,
            "tasklist auto root: update_tasks",
        )?;
        let next = Self::batch_handler(
            &next,
            "handleBatchCreation",
            BATCH_CREATION,
            "tasklist auto root: add_tasks",
        )?;
        let next = Self::reorganize(&next)?;
        Ok(Transformed::new(next).with_detail("root_lookups_patched", 4))
    }
}
