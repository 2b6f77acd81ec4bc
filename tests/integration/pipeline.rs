use crate::fixtures::{Extension, BUNDLE_MARKERS};
use artifact_patcher::config::{load_for_extension, PatcherConfig};
use artifact_patcher::module::{ApplyOptions, Reason};
use artifact_patcher::safety::{ArtifactLock, SafetyError};
use artifact_patcher::{PatchError, Pipeline};
use std::fs;

fn pipeline(config: &PatcherConfig) -> Pipeline {
    Pipeline::from_config(config, ApplyOptions::default()).unwrap()
}

#[test]
fn test_full_run_then_idempotent() {
    let ext = Extension::new();
    let pipeline = pipeline(&PatcherConfig::default());

    let first = pipeline.run_extension(ext.root()).unwrap();
    assert!(first.changed);
    assert_eq!(first.files.len(), 3);
    assert_eq!(first.files[0].path, ext.bundle());
    assert_eq!(first.files[0].outcomes.len(), 5);
    assert!(first.outcomes().all(|o| o.reason == Reason::Patched));

    let bundle = ext.read_bundle();
    for marker in BUNDLE_MARKERS {
        assert_eq!(bundle.matches(marker).count(), 1, "{marker}");
    }

    let after_first = ext.snapshot();
    let second = pipeline.run_extension(ext.root()).unwrap();
    assert!(!second.changed);
    assert!(second.outcomes().all(|o| o.reason == Reason::AlreadyPatched));
    assert_eq!(ext.snapshot(), after_first);
}

#[test]
fn test_only_matching_assets_are_touched() {
    let ext = Extension::new();
    pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap();

    let untouched = fs::read_to_string(ext.assets().join("index-e5f6.js")).unwrap();
    assert_eq!(untouched, "console.log(1)\n");

    let tool_use = fs::read_to_string(ext.assets().join("AugmentMessage-a1b2.js")).unwrap();
    assert!(tool_use.ends_with("/*__augment_byok_webview_tooluse_fallback_v1*/\n"));
}

#[test]
fn test_renamed_method_aborts_without_writing() {
    let ext = Extension::new();
    ext.write_bundle(&ext.read_bundle().replace("async callApi(", "async callApiV2("));
    let before = ext.snapshot();

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("official-overrides: "), "{message}");
    assert!(message.contains("callApi"), "{message}");
    assert!(err.is_drift());
    assert_eq!(ext.snapshot(), before);
}

#[test]
fn test_later_drift_keeps_earlier_module_writes() {
    let ext = Extension::new();
    ext.write_bundle(&ext.read_bundle().replace("V0.formatBulkUpdateResponse", "V1.formatBulkUpdateResponse"));

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(err.to_string().starts_with("tasklist-add-tasks-errors: "));

    let bundle = ext.read_bundle();
    for marker in &BUNDLE_MARKERS[..4] {
        assert!(bundle.contains(marker), "{marker}");
    }
    assert!(!bundle.contains(BUNDLE_MARKERS[4]));
}

#[test]
fn test_dry_run_reports_without_writing() {
    let ext = Extension::new();
    let before = ext.snapshot();

    let report = Pipeline::from_config(
        &PatcherConfig::default(),
        ApplyOptions {
            dry_run: true,
            preview: true,
        },
    )
    .unwrap()
    .run_extension(ext.root())
    .unwrap();

    assert!(report.changed);
    assert!(report.dry_run);
    assert!(report.outcomes().all(|o| o.preview.is_some()));
    assert_eq!(ext.snapshot(), before);
}

#[test]
fn test_module_subset_from_local_config() {
    let ext = Extension::new();
    ext.write_config(
        r#"
[memories]
default_upper_bound_size = 4096

[pipeline]
modules = ["memories-upper-bound-size"]
"#,
    );

    let config = load_for_extension(None, ext.root()).unwrap();
    let report = pipeline(&config).run_extension(ext.root()).unwrap();

    assert_eq!(report.files.len(), 1);
    let outcome = &report.files[0].outcomes[0];
    assert_eq!(outcome.module, "memories-upper-bound-size");
    assert_eq!(outcome.details.get("default_upper_bound_size"), Some(&4096));
    assert!(ext.read_bundle().contains("upper_bound_size)||4096;"));
    assert!(!ext.read_bundle().contains(BUNDLE_MARKERS[0]));
}

#[test]
fn test_version_gate() {
    let ext = Extension::new();
    let mut config = PatcherConfig::default();

    config.meta.version_range = Some(">=0.700.0".to_string());
    let err = pipeline(&config).run_extension(ext.root()).unwrap_err();
    assert!(matches!(
        err,
        PatchError::UnsupportedVersion { ref found, .. } if found == "0.612.0"
    ));
    assert!(!ext.read_bundle().contains(BUNDLE_MARKERS[0]));

    config.meta.version_range = Some(">=0.600.0, <0.700.0".to_string());
    assert!(pipeline(&config).run_extension(ext.root()).unwrap().changed);
}

#[test]
fn test_missing_package_json_skips_version_gate() {
    let ext = Extension::new();
    fs::remove_file(ext.root().join("package.json")).unwrap();

    let mut config = PatcherConfig::default();
    config.meta.version_range = Some(">=9.0.0".to_string());
    assert!(pipeline(&config).run_extension(ext.root()).unwrap().changed);
}

#[test]
fn test_missing_assets_dir_names_module() {
    let ext = Extension::new();
    fs::remove_dir_all(ext.assets()).unwrap();

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("webview-tooluse-fallback: webview assets dir missing"));
    assert!(matches!(err.root(), PatchError::AssetsDirMissing(_)));
}

#[test]
fn test_missing_bundle_is_reported_before_any_write() {
    let ext = Extension::new();
    fs::remove_file(ext.bundle()).unwrap();
    let asset = ext.assets().join("AugmentMessage-a1b2.js");

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(err.to_string().starts_with("official-overrides: missing file"));
    assert!(matches!(err.root(), PatchError::MissingFile(_)));
    assert_eq!(
        fs::read_to_string(asset).unwrap(),
        crate::fixtures::TOOL_USE_ASSET
    );
}

#[test]
fn test_status_reflects_markers() {
    let ext = Extension::new();
    let pipeline = pipeline(&PatcherConfig::default());

    let before = pipeline.status(ext.root()).unwrap();
    assert_eq!(before.len(), 7);
    assert!(before.iter().all(|s| !s.applied));

    pipeline.run_extension(ext.root()).unwrap();
    let after = pipeline.status(ext.root()).unwrap();
    assert!(after.iter().all(|s| s.applied));
}

#[test]
fn test_concurrent_run_fails_fast() {
    let ext = Extension::new();
    let before = ext.read_bundle();
    let _held = ArtifactLock::acquire(&ext.bundle()).unwrap();

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(matches!(err.root(), PatchError::Safety(SafetyError::Locked(_))));
    assert_eq!(ext.read_bundle(), before);
}

#[test]
fn test_filesystem_root_is_rejected() {
    let err = pipeline(&PatcherConfig::default())
        .run_extension(std::path::Path::new("/"))
        .unwrap_err();
    assert!(matches!(
        err,
        PatchError::Safety(SafetyError::InvalidExtensionDir(_))
    ));
}

#[cfg(unix)]
#[test]
fn test_asset_symlink_escaping_extension_is_rejected() {
    let ext = Extension::new();
    let outside = tempfile::tempdir().unwrap();
    let target = outside.path().join("AugmentMessage-evil.js");
    fs::write(&target, crate::fixtures::TOOL_USE_ASSET).unwrap();
    std::os::unix::fs::symlink(&target, ext.assets().join("AugmentMessage-0000.js")).unwrap();

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(matches!(
        err.root(),
        PatchError::Safety(SafetyError::OutsideExtension { .. })
    ));
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        crate::fixtures::TOOL_USE_ASSET
    );
}

#[cfg(unix)]
#[test]
fn test_dangling_asset_link_fails_the_run() {
    let ext = Extension::new();
    std::os::unix::fs::symlink(
        ext.assets().join("missing.js"),
        ext.assets().join("AugmentMessage-ffff.js"),
    )
    .unwrap();
    let bundle = ext.read_bundle();

    let err = pipeline(&PatcherConfig::default())
        .run_extension(ext.root())
        .unwrap_err();
    assert!(err.to_string().starts_with("webview-tooluse-fallback: missing file"), "{err}");
    assert!(matches!(err.root(), PatchError::MissingFile(_)));
    assert_eq!(ext.read_bundle(), bundle);
}
