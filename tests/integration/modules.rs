use crate::fixtures::{bundle_text, Extension, HISTORY_ASSET, TOOL_USE_ASSET};
use artifact_patcher::module::{patch_file, patch_text, ApplyOptions, PatchModule, Reason};
use artifact_patcher::patches::{
    MemoriesUpperBoundSize, OfficialOverrides, TasklistAddTasksErrors, TasklistAutoRoot,
    TasklistSanitizeEmptyIds, WebviewHistorySummaryNode, WebviewToolUseFallback,
};
use artifact_patcher::PatchError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_memories_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("extension.js");
    fs::write(&path, "let q=f().flags.memoriesParams.upper_bound_size;").unwrap();

    let module = MemoriesUpperBoundSize::default();
    let first = patch_file(&module, &path, ApplyOptions::default()).unwrap();
    assert!(first.changed);
    assert_eq!(first.reason, Reason::Patched);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("let __byok_memoriesParams=f().flags.memoriesParams;"));
    assert!(text.contains("let q=(__byok_memoriesParams&&__byok_memoriesParams.upper_bound_size)||10000;"));
    assert!(text.ends_with("/*__augment_byok_memories_upper_bound_size_patched_v1*/\n"));

    let second = patch_file(&module, &path, ApplyOptions::default()).unwrap();
    assert!(!second.changed);
    assert_eq!(second.reason, Reason::AlreadyPatched);
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[test]
fn test_missing_file_is_reported_first() {
    let dir = TempDir::new().unwrap();
    let err = patch_file(
        &TasklistAutoRoot,
        &dir.path().join("nope.js"),
        ApplyOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err.root(), PatchError::MissingFile(_)));
}

#[test]
fn test_bundle_modules_compose_on_one_snapshot_chain() {
    let modules: [&dyn PatchModule; 5] = [
        &OfficialOverrides,
        &MemoriesUpperBoundSize::default(),
        &TasklistAutoRoot,
        &TasklistSanitizeEmptyIds,
        &TasklistAddTasksErrors,
    ];

    let mut text = bundle_text();
    for module in modules {
        let patch = patch_text(module, &text).unwrap();
        assert_eq!(patch.reason(), Reason::Patched, "{}", module.name());
        text = patch.text.unwrap();
    }

    // Generated code refers to the captured names of this bundle.
    assert!(text.contains("let a=this._taskManager.getRootTaskUuid(s);if(!a&&s&&"));
    assert!(text.contains("typeof d.parent_task_id===\"string\""));
    assert!(text.contains("let __byok_failed=l.filter("));
    assert!(text.contains("m+=__byok_msg;}return{...xr(m),plan:u}"));

    for module in modules {
        assert_eq!(patch_text(module, &text).unwrap().reason(), Reason::AlreadyPatched);
    }
}

#[test]
fn test_transform_is_deterministic() {
    let first = OfficialOverrides.transform(&bundle_text()).unwrap();
    let second = OfficialOverrides.transform(&bundle_text()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_webview_modules_on_assets() {
    let ext = Extension::new();

    let tool_use = ext.assets().join("AugmentMessage-a1b2.js");
    let outcome = patch_file(&WebviewToolUseFallback, &tool_use, ApplyOptions::default()).unwrap();
    assert_eq!(outcome.details.get("replacements"), Some(&3));
    let patched = fs::read_to_string(&tool_use).unwrap();
    assert!(patched.contains("return E.length?E:t.toolUseNodes.filter((C=>!!C.tool_use))"));
    assert!(!patched.contains("i()?.length&&m($)"));

    let history = ext.assets().join("extension-client-context-c3d4.js");
    patch_file(&WebviewHistorySummaryNode, &history, ApplyOptions::default()).unwrap();
    let patched = fs::read_to_string(&history).unwrap();
    assert!(patched.contains("U={id:0,type:Ce.TEXT,text_node:{content:V5(C)}}"));
    assert_ne!(patched, HISTORY_ASSET);
}

#[test]
fn test_ambiguous_literal_leaves_asset_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("AugmentMessage-x.js");
    let doubled = format!("{TOOL_USE_ASSET}{TOOL_USE_ASSET}");
    fs::write(&path, &doubled).unwrap();

    let err = patch_file(&WebviewToolUseFallback, &path, ApplyOptions::default()).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("webview-tooluse-fallback: needle matched multiple times"));
    assert!(message.contains("2 matches"));
    assert_eq!(fs::read_to_string(&path).unwrap(), doubled);
}

#[test]
fn test_drift_error_names_method() {
    let drifted = bundle_text().replace("async callApiStream(", "async callApiStreamV2(");
    let err = OfficialOverrides.transform(&drifted).unwrap_err();
    assert_eq!(
        err.to_string(),
        "needle not found: callApiStream (upstream may have changed)"
    );
}
