//! Route official-backend calls through the BYOK official connection.
//!
//! Runtime code in `./byok/config/official` supplies the token and completion
//! URL. This module rewires the client auth getters, the settings fallbacks,
//! the config normalizer, base-path joining, disabled-endpoint routing, the
//! error messages, and the `callApi`/`callApiStream` argument overrides.

use super::js_ident;
use crate::anchor::{replace_regex_all, replace_regex_expected, Expect, RegexAnchor};
use crate::error::PatchError;
use crate::inject::{inject_into_callable_bodies, inject_once_after_literal};
use crate::module::{PatchModule, Target, Transformed};
use tracing::debug;

pub const MARKER: &str = "__augment_byok_official_overrides_patched_v1";

const API_TOKEN_GETTER: &str = "async getAPIToken(){";
const API_TOKEN_OVERRIDE: &str = r#"try{const __byok_off=require("./byok/config/official").getOfficialConnection();if(__byok_off.apiToken)return __byok_off.apiToken}catch{}"#;

const COMPLETION_URL_GETTER: &str = "async getCompletionURL(){";
const COMPLETION_URL_OVERRIDE: &str = r#"try{const __byok_off=require("./byok/config/official").getOfficialConnection();if(__byok_off.apiToken&&__byok_off.completionURL)return __byok_off.completionURL}catch{}"#;

/// (pattern, replacement, label); each must match at least once.
const SETTINGS_FALLBACKS: [(&str, &str, &str); 2] = [
    (
        r"return this\.configListener\.config\.apiToken",
        r#"return """#,
        "clientAuth apiToken settings fallback",
    ),
    (
        r"return this\.configListener\.config\.completionURL",
        r#"return require("./byok/config/official").DEFAULT_OFFICIAL_COMPLETION_URL"#,
        "clientAuth completionURL settings fallback",
    ),
];

const NORMALIZE_CONNECTION: &str = r#"apiToken:\(t\?\.\s*advanced\?\.\s*apiToken\?\?t\.apiToken\?\?""\)\.trim\(\)\.toUpperCase\(\),completionURL:\(t\?\.\s*advanced\?\.\s*completionURL\?\?t\.completionURL\?\?""\)\.trim\(\)"#;
const NORMALIZED_CONNECTION: &str = r#"apiToken:(()=>{try{const __byok_conn=require("./byok/config/official").getOfficialConnection();return (__byok_conn.apiToken||"").trim()}catch{return""}})(),completionURL:(()=>{try{const __byok_off=require("./byok/config/official");const __byok_conn=__byok_off.getOfficialConnection();const __byok_tok=(__byok_conn.apiToken||"").trim();return __byok_tok?(__byok_conn.completionURL||__byok_off.DEFAULT_OFFICIAL_COMPLETION_URL||"https://api.augmentcode.com/").trim():""}catch{return""}})()"#;

/// `new URL("/x", base)` drops the base path; strip the leading slash first.
const RELATIVE_ENDPOINT: &str = r#"new URL((typeof t==="string"&&t[0]==="/")?t.slice(1):t,"#;

const URL_JOINS: [(&str, &str, &str); 2] = [
    (
        r"new URL\(t,a\)",
        "a)",
        "makeAuthenticatedCall preserve base path",
    ),
    (
        r"new URL\(t,c\.tenantUrl\)",
        "c.tenantUrl)",
        "makeAuthenticatedCallStream preserve base path",
    ),
];

const AUTHENTICATED_CALL: &str = r#"async makeAuthenticatedCall(t,r,n,i="POST",o){"#;
const AUTHENTICATED_CALL_STREAM: &str = r#"async makeAuthenticatedCallStream(t,r,n,i="post",o){"#;

const ERROR_MESSAGES: [(&str, &str, &str); 3] = [
    (
        r"throw new st\(`API call failed: \$\{d\.statusText\}`,Xe\.Internal\)",
        "throw new st(`API call failed: ${d.status} ${d.statusText} (${l.toString()})`,Xe.Internal)",
        "makeAuthenticatedCall error message include url",
    ),
    (
        r"throw new st\(`API call failed: \$\{f\.statusText\}`,Xe\.Internal\)",
        "throw new st(`API call failed: ${f.status} ${f.statusText} (${u.toString()})`,Xe.Internal)",
        "makeAuthenticatedCallStream error message include url",
    ),
    (
        r"throw new st\(`API call failed: \$\{h\.statusText\}`,Xe\.Internal\)",
        "throw new st(`API call failed: ${h.status} ${h.statusText} (${u.toString()})`,Xe.Internal)",
        "makeAuthenticatedCallStream retry error message include url",
    ),
];

const COMPLETION_URL_COALESCE: &str = concat!(
    r"\b(?P<var>",
    js_ident!(),
    r")=(?P<var_ref>",
    js_ident!(),
    r")\?\?await this\.clientAuth\.getCompletionURL\(\)",
);

/// Short-circuit for endpoints routed as `disabled` in the BYOK config.
fn disabled_endpoint_guard(early_return: &str) -> String {
    format!(
        concat!(
            r#"try{{const __byok_state=require("./byok/config/state");"#,
            "const __byok_cfg=__byok_state.ensureConfigManager().get();",
            "const __byok_rules=__byok_cfg&&__byok_cfg.routing&&__byok_cfg.routing.rules;",
            r#"const __byok_ep=typeof t==="string"?t:"";"#,
            r#"const __byok_norm=__byok_ep&&__byok_ep[0]==="/" ? __byok_ep : "/"+__byok_ep;"#,
            "const __byok_r=__byok_rules&&__byok_rules[__byok_norm];",
            r#"if(__byok_r&&__byok_r.mode==="disabled"){early_return}"#,
            "}}catch{{}}",
        ),
        early_return = early_return
    )
}

const OFFICIAL_CONNECTION: &str = concat!(
    r#"const __byok_off=require("./byok/config/official");"#,
    "const __byok_conn=__byok_off.getOfficialConnection();",
    "const __byok_useOAuth=!!(this&&this.clientAuth&&this.clientAuth.auth&&this.clientAuth.auth.useOAuth);",
);

/// Loopback base URLs are replaced with the default official URL.
fn loopback_base_fallback(base: &str) -> String {
    format!(
        concat!(
            r#"const __byok_base=typeof {base}==="string"?{base}:({base}&&typeof {base}.toString==="function"?{base}.toString():"");"#,
            r#"if(__byok_base&&(__byok_base.includes("127.0.0.1")||__byok_base.includes("0.0.0.0")||__byok_base.includes("localhost")||__byok_base.includes("[::1]"))){base}=__byok_off.DEFAULT_OFFICIAL_COMPLETION_URL"#,
        ),
        base = base
    )
}

/// `callApi` carries the base URL at position 5 and the token at position 10.
fn call_api_override(params: &[String]) -> Option<String> {
    let base = params.get(5)?;
    let token = params.get(10)?;
    Some(format!(
        concat!(
            "try{{{connection}",
            "if(__byok_conn.apiToken&&!__byok_useOAuth){{if(__byok_conn.completionURL){base}=__byok_conn.completionURL;{token}=__byok_conn.apiToken;}}",
            "{fallback}}}catch{{}}",
            "if(!{base}){base}=await this.clientAuth.getCompletionURL();",
            "if(!{token}){token}=await this.clientAuth.getAPIToken();",
        ),
        connection = OFFICIAL_CONNECTION,
        fallback = loopback_base_fallback(base),
        base = base,
        token = token
    ))
}

/// `callApiStream` carries the base URL at position 5.
fn call_api_stream_override(params: &[String]) -> Option<String> {
    let base = params.get(5)?;
    Some(format!(
        concat!(
            "try{{{connection}",
            "if(__byok_conn.apiToken&&__byok_conn.completionURL&&!__byok_useOAuth){base}=__byok_conn.completionURL;",
            "{fallback}}}catch{{}}",
        ),
        connection = OFFICIAL_CONNECTION,
        fallback = loopback_base_fallback(base),
        base = base
    ))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfficialOverrides;

impl OfficialOverrides {
    fn auth_getters(text: &str) -> Result<String, PatchError> {
        let next = inject_once_after_literal(
            text,
            API_TOKEN_GETTER,
            API_TOKEN_OVERRIDE,
            "clientAuth.getAPIToken",
        )?;
        inject_once_after_literal(
            &next,
            COMPLETION_URL_GETTER,
            COMPLETION_URL_OVERRIDE,
            "clientAuth.getCompletionURL",
        )
    }

    fn settings_fallbacks(text: &str) -> Result<String, PatchError> {
        let mut next = text.to_string();
        for (pattern, replacement, label) in SETTINGS_FALLBACKS {
            let anchor = RegexAnchor::new(pattern, label)?;
            next = replace_regex_all(&next, &anchor, Expect::AtLeastOne, |_| {
                Ok(replacement.to_string())
            })?
            .text;
        }
        Ok(next)
    }

    fn normalize_config(text: &str) -> Result<String, PatchError> {
        let anchor = RegexAnchor::new(NORMALIZE_CONNECTION, "normalizeConfig official connection")?;
        Ok(replace_regex_expected(text, &anchor, NORMALIZED_CONNECTION, 1)?.text)
    }

    fn url_joins(text: &str) -> Result<String, PatchError> {
        let mut next = text.to_string();
        for (pattern, base, label) in URL_JOINS {
            let anchor = RegexAnchor::new(pattern, label)?;
            let replacement = format!("{RELATIVE_ENDPOINT}{base}");
            next = replace_regex_expected(&next, &anchor, &replacement, 1)?.text;
        }
        Ok(next)
    }

    fn disabled_endpoints(text: &str) -> Result<String, PatchError> {
        let next = inject_once_after_literal(
            text,
            AUTHENTICATED_CALL,
            &disabled_endpoint_guard("return {};"),
            "makeAuthenticatedCall disabled endpoint",
        )?;
        inject_once_after_literal(
            &next,
            AUTHENTICATED_CALL_STREAM,
            &disabled_endpoint_guard("return(async function*(){})();"),
            "makeAuthenticatedCallStream disabled endpoint",
        )
    }

    fn error_messages(text: &str) -> Result<String, PatchError> {
        let mut next = text.to_string();
        for (pattern, replacement, label) in ERROR_MESSAGES {
            let anchor = RegexAnchor::new(pattern, label)?;
            next = replace_regex_expected(&next, &anchor, replacement, 1)?.text;
        }
        Ok(next)
    }

    fn completion_url_coalesce(text: &str) -> Result<(String, usize), PatchError> {
        let anchor = RegexAnchor::new(COMPLETION_URL_COALESCE, "callApiStream completionURL coalesce")?
            .require_same("var", "var_ref");
        let replaced = replace_regex_all(text, &anchor, Expect::Any, |caps| {
            let var = caps.require("var")?;
            Ok(format!("{var}={var}||await this.clientAuth.getCompletionURL()"))
        })?;
        Ok((replaced.text, replaced.count))
    }
}

impl PatchModule for OfficialOverrides {
    fn name(&self) -> &'static str {
        "official-overrides"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn target(&self) -> Target {
        Target::Bundle
    }

    fn transform(&self, text: &str) -> Result<Transformed, PatchError> {
        let next = Self::auth_getters(text)?;
        let next = Self::settings_fallbacks(&next)?;
        let next = Self::normalize_config(&next)?;
        let next = Self::url_joins(&next)?;
        let next = Self::disabled_endpoints(&next)?;
        let next = Self::error_messages(&next)?;

        let call_api = inject_into_callable_bodies(&next, "callApi", call_api_override)?;
        let stream = inject_into_callable_bodies(&call_api.text, "callApiStream", call_api_stream_override)?;
        let (next, coalesced) = Self::completion_url_coalesce(&stream.text)?;

        debug!(
            call_api = call_api.count,
            call_api_stream = stream.count,
            coalesced,
            "official overrides applied"
        );
        Ok(Transformed::new(next)
            .with_detail("call_api_patched", call_api.count as u64)
            .with_detail("call_api_stream_patched", stream.count as u64)
            .with_detail("call_api_stream_coalesce_patched", coalesced as u64))
    }
}
