//! Drop empty-string `parent_task_id`/`after_task_id` before `add_tasks`
//! creates each task.
//!
//! Models often send `""` for optional ids, which upstream rejects as
//! "Parent task not found" or "Target task not found".

use super::js_ident;
use crate::anchor::{replace_regex_once, RegexAnchor};
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_tasklist_add_tasks_sanitize_empty_ids_patched_v1";

const BATCH_LOOP: &str = concat!(
    r"for\(let\s+(?P<item>",
    js_ident!(),
    r")\s+of\s+(?P<tasks>",
    js_ident!(),
    r")\)try\{let\s+(?P<result>",
    js_ident!(),
    r")=await\s+this\.createSingleTaskFromInput\((?P<conv>",
    js_ident!(),
    r"),(?P<item_ref>",
    js_ident!(),
    r")\);",
);

/// Optional id fields stripped when blank.
const OPTIONAL_IDS: [&str; 2] = ["parent_task_id", "after_task_id"];

fn strip_blank_ids(item: &str) -> String {
    OPTIONAL_IDS
        .iter()
        .map(|field| {
            format!(
                "typeof {item}.{field}===\"string\"&&{item}.{field}.trim()===\"\"&&delete {item}.{field};"
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TasklistSanitizeEmptyIds;

impl PatchModule for TasklistSanitizeEmptyIds {
    fn name(&self) -> &'static str {
        "tasklist-add-tasks-sanitize-empty-ids"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::Bundle
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let anchor = RegexAnchor::new(BATCH_LOOP, "tasklist add_tasks sanitize empty ids: batch loop")?
            .require_same("item", "item_ref");
        let next = replace_regex_once(text, &anchor, |caps| {
            let item = caps.require("item")?;
            let tasks = caps.require("tasks")?;
            let result = caps.require("result")?;
            let conv = caps.require("conv")?;
            Ok(format!(
                "for(let {item} of {tasks})try{{{}let {result}=await this.createSingleTaskFromInput({conv},{item});",
                strip_blank_ids(item)
            ))
        })?;
        Ok(Transformed::new(next))
    }
}
