//! Slim HISTORY_SUMMARY state nodes in the `extension-client-context` asset.
//!
//! The summary node stored in request state embeds the full `history_end`
//! exchanges. Later paths clone or stringify request nodes, which can exhaust
//! memory. The same payload is stored instead as a TEXT node whose content is
//! the rendered summary, so the model sees the same prompt.

use crate::anchor::replace_literal_once;
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_webview_history_summary_node_slim_v1";
pub const ASSET_PREFIX: &str = "extension-client-context-";

const SUMMARY_NODE: &str = r#"if(n.useHistorySummaryNew){const C={summary_text:F.responseText,summarization_request_id:F.requestId,history_beginning_dropped_num_exchanges:V,history_middle_abridged_text:X,history_end:c,message_template:n.summaryNodeRequestMessageTemplateNew},U={id:0,type:Ce.HISTORY_SUMMARY,history_summary_node:C};console.info("Storing HISTORY_SUMMARY node for next exchange"),yield*E(rS(t,U))}"#;

const TEXT_NODE: &str = r#"if(n.useHistorySummaryNew){const C={summary_text:F.responseText,summarization_request_id:F.requestId,history_beginning_dropped_num_exchanges:V,history_middle_abridged_text:X,history_end:c,message_template:n.summaryNodeRequestMessageTemplateNew},U={id:0,type:Ce.TEXT,text_node:{content:V5(C)}};console.info("Storing HISTORY_SUMMARY node for next exchange"),yield*E(rS(t,U))}"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct WebviewHistorySummaryNode;

impl PatchModule for WebviewHistorySummaryNode {
    fn name(&self) -> &'static str {
        "webview-history-summary-node"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::WebviewAsset {
            prefix: ASSET_PREFIX,
        }
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let next = replace_literal_once(
            text,
            SUMMARY_NODE,
            TEXT_NODE,
            "extension-client-context HISTORY_SUMMARY node slimming",
        )?;
        Ok(Transformed::new(next))
    }
}
