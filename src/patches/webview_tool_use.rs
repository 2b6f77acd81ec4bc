//! Tool-use card fallback for the `AugmentMessage` webview asset.
//!
//! After a restart the displayable tool-use store can be empty while the
//! turn's structured output still carries TOOL_USE nodes. The list falls back
//! to `t.toolUseNodes`, and layout/render gates key off the rendered list.

use crate::anchor::replace_literal_once;
use crate::error::PatchError;
use crate::module::{PatchModule, Target, Transformed};

pub const MARKER: &str = "__augment_byok_webview_tooluse_fallback_v1";
pub const ASSET_PREFIX: &str = "AugmentMessage-";

const REWRITES: [(&str, &str, &str); 3] = [
    (
        "const L=r((()=>i().filter((m=>!!m.tool_use))));",
        "const L=r((()=>{const m=i();const E=Array.isArray(m)?m.filter((C=>!!C.tool_use)):[];return E.length?E:t.toolUseNodes.filter((C=>!!C.tool_use))}));",
        "AugmentMessage tool list nodes fallback",
    ),
    (
        "i().length===1?P(N):P(O,!1)",
        "e(L).length===1?P(N):P(O,!1)",
        "AugmentMessage tool list layout",
    ),
    (
        "i()?.length&&m($)",
        "e(L).length&&m($)",
        "AugmentMessage tool list render gate",
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct WebviewToolUseFallback;

impl PatchModule for WebviewToolUseFallback {
    fn name(&self) -> &'static str {
        "webview-tooluse-fallback"
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
        let mut next = text.to_string();
        for (needle, replacement, label) in REWRITES {
            next = replace_literal_once(&next, needle, replacement, label)?;
        }
        Ok(Transformed::new(next).with_detail("replacements", REWRITES.len() as u64))
    }
}
