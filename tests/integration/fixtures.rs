//! Synthetic extension layout carrying every anchor the shipped modules need.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const OFFICIAL: &str = concat!(
    "class ClientAuth{",
    "async getAPIToken(){return this.configListener.config.apiToken}",
    "async getCompletionURL(){return this.configListener.config.completionURL}",
    "}",
    r#"function normalizeConfig(t){return{apiToken:(t?.advanced?.apiToken??t.apiToken??"").trim().toUpperCase(),completionURL:(t?.advanced?.completionURL??t.completionURL??"").trim()}}"#,
    "class ApiServer{",
    r#"async makeAuthenticatedCall(t,r,n,i="POST",o){let a=await this.base(),l=new URL(t,a),d=await fetch(l);if(!d.ok)throw new st(`API call failed: ${d.statusText}`,Xe.Internal);return d}"#,
    r#"async makeAuthenticatedCallStream(t,r,n,i="post",o){let c=await this.cfg(),u=new URL(t,c.tenantUrl),f=await fetch(u);if(!f.ok)throw new st(`API call failed: ${f.statusText}`,Xe.Internal);let h=await fetch(u);if(!h.ok)throw new st(`API call failed: ${h.statusText}`,Xe.Internal);return f}"#,
    "async callApi(e,t,r,n,i,B,o,s,a,l,T){return this.post(B,T,t)}",
    "async callApiStream(e,t,r,n,i,B,o){B=B??await this.clientAuth.getCompletionURL();return this.stream(B,t)}",
    "}",
);

pub const MEMORIES: &str = r#"class Memories{_setMemories(){let q=f().flags.memoriesParams.upper_bound_size;if(!q)throw new Error("upper bound size missing")}}"#;

pub const TASKLIST: &str = concat!(
    r#"class ViewTaskListTool{async call(e,r,n,i,o,s){try{let a=this._taskManager.getRootTaskUuid(s);if(!a)return it("No root task found.");return xr(a)}catch(x){return it(x.message)}}}"#,
    r#"class UpdateTasksTool{async handleBatchUpdate(e,r){let s=this._taskManager.getRootTaskUuid(e);if(!s)return it("No root task found.");return xr(s)}}"#,
    r#"class AddTasksTool{async handleBatchCreation(e,r){let s=this._taskManager.getRootTaskUuid(e);if(!s)return it("No root task found.");"#,
    "let o=r.tasks;let l=[];for(let d of o)try{let p=await this.createSingleTaskFromInput(e,d);l.push(p)}catch(x){l.push({success:!1,taskName:d.name,error:x.message})}",
    "let c=await this.snap(s),u=await this.snap(s);let m=V0.formatBulkUpdateResponse(Qk(c,u));return{...xr(m),plan:u}}}",
    r#"class ReorganizeTaskListTool{async call(e,r,n,i,o,s){try{let m=r.markdown;if(!m)return it("No markdown provided.");let k=this._taskManager.getRootTaskUuid(s);if(!k)return it("No root task found.");return xr(k)}catch(x){return it(x.message)}}}"#,
);

pub const TOOL_USE_ASSET: &str = concat!(
    "function X(t){const i=s(t.nodes);",
    "const L=r((()=>i().filter((m=>!!m.tool_use))));",
    "var g=i().length===1?P(N):P(O,!1);",
    "i()?.length&&m($)}\n",
);

pub const HISTORY_ASSET: &str = concat!(
    "function*g(){",
    r#"if(n.useHistorySummaryNew){const C={summary_text:F.responseText,summarization_request_id:F.requestId,history_beginning_dropped_num_exchanges:V,history_middle_abridged_text:X,history_end:c,message_template:n.summaryNodeRequestMessageTemplateNew},U={id:0,type:Ce.HISTORY_SUMMARY,history_summary_node:C};console.info("Storing HISTORY_SUMMARY node for next exchange"),yield*E(rS(t,U))}"#,
    "}\n",
);

pub const BUNDLE_MARKERS: [&str; 5] = [
    "__augment_byok_official_overrides_patched_v1",
    "__augment_byok_memories_upper_bound_size_patched_v1",
    "__augment_byok_tasklist_auto_root_patched_v1",
    "__augment_byok_tasklist_add_tasks_sanitize_empty_ids_patched_v1",
    "__augment_byok_tasklist_add_tasks_errors_patched_v1",
];

pub fn bundle_text() -> String {
    format!("\"use strict\";\n{OFFICIAL}\n{MEMORIES}\n{TASKLIST}\n")
}

/// A temporary unpacked extension:
///
/// ```text
/// package.json
/// out/extension.js
/// common-webviews/assets/AugmentMessage-a1b2.js
/// common-webviews/assets/extension-client-context-c3d4.js
/// ```
pub struct Extension {
    _dir: TempDir,
    root: PathBuf,
}

impl Extension {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();

        fs::write(
            root.join("package.json"),
            r#"{"name":"vscode-augment","version":"0.612.0"}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join("out/extension.js"), bundle_text()).unwrap();

        let assets = root.join("common-webviews/assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("AugmentMessage-a1b2.js"), TOOL_USE_ASSET).unwrap();
        fs::write(assets.join("extension-client-context-c3d4.js"), HISTORY_ASSET).unwrap();
        fs::write(assets.join("index-e5f6.js"), "console.log(1)\n").unwrap();

        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle(&self) -> PathBuf {
        self.root.join("out/extension.js")
    }

    pub fn assets(&self) -> PathBuf {
        self.root.join("common-webviews/assets")
    }

    pub fn read_bundle(&self) -> String {
        fs::read_to_string(self.bundle()).unwrap()
    }

    pub fn write_bundle(&self, text: &str) {
        fs::write(self.bundle(), text).unwrap();
    }

    pub fn write_config(&self, toml: &str) {
        fs::write(self.root.join("artifact-patcher.toml"), toml).unwrap();
    }

    /// Every file the pipeline may touch, with its current bytes.
    pub fn snapshot(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = vec![self.bundle()];
        for entry in fs::read_dir(self.assets()).unwrap() {
            files.push(entry.unwrap().path());
        }
        files.sort();
        files
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path).unwrap();
                (path, bytes)
            })
            .collect()
    }
}
