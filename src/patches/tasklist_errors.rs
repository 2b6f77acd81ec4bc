//! Surface per-task failures from `add_tasks`.
//!
//! Upstream swallows `createSingleTaskFromInput` errors and reports success
//! with an unchanged plan. The response now lists up to ten failures, and a
//! batch where every task failed becomes a tool error.

use super::js_ident;
use crate::anchor::{replace_regex_once, RegexAnchor};
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_tasklist_add_tasks_errors_patched_v1";

/// Failures listed individually before the rest are summarized as a count.
const LISTED_FAILURES: usize = 10;

const BATCH_CREATION: &str = concat!(
    r"async handleBatchCreation\((?:",
    js_ident!(),
    r"),(?:",
    js_ident!(),
    r")\)\{[\s\S]*?let\s+(?P<results>",
    js_ident!(),
    r")=\[\];for\(let[\s\S]*?let\s+(?P<text>",
    js_ident!(),
    r")=V0\.formatBulkUpdateResponse\(Qk\((?P<before>",
    js_ident!(),
    r"),(?P<after>",
    js_ident!(),
    r")\)\);return\{\.\.\.xr\((?P<text_ref>",
    js_ident!(),
    r")\),plan:(?P<after_ref>",
    js_ident!(),
    r")\}\}",
);

/// Failure summary appended to the response text. `\n` stays escaped so it
/// lands in the bundle as a JS string escape.
fn failure_summary(results: &str, text: &str, after: &str) -> String {
    format!(
        concat!(
            "let __byok_failed={results}.filter(t=>t&&t.success===!1);",
            "if(__byok_failed.length){{",
            r#"let __byok_lines=__byok_failed.slice(0,{listed}).map(t=>"- "+String(t.taskName)+": "+String(t.error||"unknown")).join("\n");"#,
            r#"let __byok_more=__byok_failed.length>{listed}?"\n… ("+String(__byok_failed.length-{listed})+" more)":"";"#,
            r#"let __byok_msg="\n\nTask creation failures ("+String(__byok_failed.length)+"/"+String({results}.length)+"):\n"+__byok_lines+__byok_more;"#,
            r#"if(__byok_failed.length==={results}.length)return{{...it("Failed to add task(s)."+__byok_msg),plan:{after}}};"#,
            "{text}+=__byok_msg;",
            "}}",
        ),
        results = results,
        text = text,
        after = after,
        listed = LISTED_FAILURES
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TasklistAddTasksErrors;

impl PatchModule for TasklistAddTasksErrors {
    fn name(&self) -> &'static str {
        "tasklist-add-tasks-errors"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::Bundle
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let anchor = RegexAnchor::new(BATCH_CREATION, "tasklist add_tasks errors: handleBatchCreation")?
            .require_same("text", "text_ref")
            .require_same("after", "after_ref");

        let next = replace_regex_once(text, &anchor, |caps| {
            let results = caps.require("results")?;
            let text = caps.require("text")?;
            let before = caps.require("before")?;
            let after = caps.require("after")?;

            let response = format!("let {text}=V0.formatBulkUpdateResponse(Qk({before},{after}));");
            let ret = format!("return{{...xr({text}),plan:{after}}}");
            caps.replace_tail(
                &format!("{response}{ret}"),
                &format!("{response}{}{ret}", failure_summary(results, text, after)),
            )
        })?;
        Ok(Transformed::new(next).with_detail("listed_failures", LISTED_FAILURES as u64))
    }
}
