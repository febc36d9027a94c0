//! Integration tests for the image lifecycle.
//!
//! The external tool is an in-memory fake that keeps a live instance list,
//! so create/clone/delete observe each other the way they would against
//! the real tool.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wslkit_common::error::{ErrorKind, Result, WslkitError};
use wslkit_common::layout::StorageLayout;
use wslkit_core::exec::{CommandOptions, CommandOutput, CommandRunner};
use wslkit_core::wsl::WslTool;
use wslkit_distro::manager::DistroCatalogManager;
use wslkit_distro::template::{Template, TemplateOrigin};
use wslkit_runtime::lifecycle::{ImageLifecycleManager, ImageOptions, ImagePatch};
use wslkit_runtime::manifest::LayerOp;
use wslkit_runtime::registry::SourceType;

// ── Fake tool ──────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    live: Vec<String>,
    calls: Vec<Vec<String>>,
    exports: Vec<PathBuf>,
    fail_import_after_register: bool,
    /// Another process registers the name while our import runs.
    lose_import_race: bool,
    fail_export: bool,
}

#[derive(Default)]
struct FakeWsl {
    state: Mutex<FakeState>,
}

impl FakeWsl {
    fn with_live(names: &[&str]) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().live = names.iter().map(ToString::to_string).collect();
        fake
    }

    fn verbs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|c| c[0].clone())
            .collect()
    }

    fn live(&self) -> Vec<String> {
        self.state.lock().unwrap().live.clone()
    }

    fn forget(&self, name: &str) {
        self.state.lock().unwrap().live.retain(|n| n != name);
    }
}

fn tool_failure(args: &[String], stderr: &str) -> WslkitError {
    WslkitError::ExternalTool {
        command: format!("wsl.exe {}", args.join(" ")),
        exit_code: Some(1),
        stderr: stderr.to_string(),
        source: None,
    }
}

#[async_trait]
impl CommandRunner for FakeWsl {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _options: &CommandOptions,
    ) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());
        let stdout = match args[0].as_str() {
            "--list" => {
                let mut out = String::from("  NAME      STATE      VERSION\n");
                for name in &state.live {
                    out.push_str(&format!("  {name}  Stopped  2\n"));
                }
                out
            }
            "--version" => "WSL version: 2.3.24.0\nKernel version: 5.15\n".to_string(),
            "--import" => {
                assert!(
                    std::path::Path::new(&args[3]).exists(),
                    "import archive must exist"
                );
                if state.lose_import_race {
                    let disk = std::path::Path::new(&args[2]).join("ext4.vhdx");
                    std::fs::write(disk, b"winner disk").expect("winner disk");
                    state.live.push(args[1].clone());
                    return Err(tool_failure(
                        args,
                        "A distribution with the supplied name already exists.",
                    ));
                }
                state.live.push(args[1].clone());
                if state.fail_import_after_register {
                    return Err(tool_failure(args, "disk image corrupt"));
                }
                String::new()
            }
            "--export" => {
                if state.fail_export || !state.live.contains(&args[1]) {
                    return Err(tool_failure(args, "no such distribution"));
                }
                std::fs::write(&args[2], b"exported rootfs").expect("write export");
                state.exports.push(PathBuf::from(&args[2]));
                String::new()
            }
            "--unregister" => {
                state.live.retain(|n| n != &args[1]);
                String::new()
            }
            _ => String::new(),
        };
        Ok(CommandOutput {
            stdout,
            ..CommandOutput::default()
        })
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

struct Harness {
    _root: tempfile::TempDir,
    layout: StorageLayout,
    wsl: Arc<FakeWsl>,
    images: ImageLifecycleManager,
}

async fn harness(wsl: FakeWsl) -> Harness {
    let root = tempfile::tempdir().expect("root");
    let layout = StorageLayout::new(root.path());
    let seed = vec![Template::new("alpine-3.19").with_origin(TemplateOrigin::Default)];
    let catalog = DistroCatalogManager::open(layout.clone(), seed).await;

    let fixture = root.path().join("ubuntu.tar");
    std::fs::write(&fixture, b"ubuntu rootfs").expect("fixture");
    let _ = catalog
        .add(Template::new("ubuntu-base"), &fixture)
        .await
        .expect("add template");

    let wsl = Arc::new(wsl);
    let tool = WslTool::new(Arc::clone(&wsl) as Arc<dyn CommandRunner>);
    let images = ImageLifecycleManager::open(layout.clone(), tool, Arc::new(catalog))
        .await
        .with_created_by("wslkit/test");
    Harness {
        _root: root,
        layout,
        wsl,
        images,
    }
}

fn tmp_entries(layout: &StorageLayout) -> usize {
    std::fs::read_dir(layout.tmp_dir()).map_or(0, Iterator::count)
}

// ── Create ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_from_available_template_records_manifest_and_registry() {
    let h = harness(FakeWsl::default()).await;

    let record = h
        .images
        .create_from_template(
            "ubuntu-base",
            "dev1",
            ImageOptions {
                description: Some("sandbox".to_string()),
                ..ImageOptions::default()
            },
        )
        .await
        .expect("create");

    assert_eq!(record.source.as_deref(), Some("ubuntu-base"));
    assert_eq!(record.source_type, Some(SourceType::Template));
    assert_eq!(record.created_by, "wslkit/test");
    assert_eq!(record.tool_version.as_deref(), Some("WSL version: 2.3.24.0"));
    assert_eq!(record.install_path, Some(h.layout.instance_dir("dev1")));
    assert_eq!(h.wsl.live(), vec!["dev1"]);

    let info = h.images.get_image_info("dev1").await.expect("info");
    let manifest = info.manifest.expect("manifest");
    assert_eq!(manifest.metadata.lineage, vec!["ubuntu-base"]);
    assert_eq!(manifest.metadata.id, record.id);
    assert_eq!(manifest.layers[0].op, LayerOp::Created);
    assert_eq!(info.record.description, "sandbox");
}

#[tokio::test]
async fn create_from_unavailable_template_never_imports() {
    let h = harness(FakeWsl::default()).await;

    let err = h
        .images
        .create_from_template("alpine-3.19", "dev1", ImageOptions::default())
        .await
        .expect_err("not downloaded");

    assert_eq!(err.kind(), ErrorKind::NotAvailable);
    assert!(!h.wsl.verbs().contains(&"--import".to_string()));
    assert!(h.images.get_image_info("dev1").await.is_none());
}

#[tokio::test]
async fn create_from_unknown_template_is_not_found() {
    let h = harness(FakeWsl::default()).await;
    let err = h
        .images
        .create_from_template("nope", "dev1", ImageOptions::default())
        .await
        .expect_err("unknown template");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn create_rejects_live_name_case_insensitively() {
    let h = harness(FakeWsl::with_live(&["Dev1"])).await;
    let err = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect_err("collision");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(!h.wsl.verbs().contains(&"--import".to_string()));
}

#[tokio::test]
async fn failed_import_rolls_back_and_reraises() {
    let wsl = FakeWsl::default();
    wsl.state.lock().unwrap().fail_import_after_register = true;
    let h = harness(wsl).await;

    let err = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect_err("import fails");

    assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    assert!(err.to_string().contains("disk image corrupt"));
    assert!(h.wsl.live().is_empty(), "partial instance unregistered");
    assert!(h.wsl.verbs().contains(&"--unregister".to_string()));
    assert!(!h.layout.instance_dir("dev1").exists());
    assert!(!h.images.manifests().has("dev1").await);
    assert!(h.images.get_image_info("dev1").await.is_none());
}

#[tokio::test]
async fn import_refused_as_duplicate_leaves_the_other_instance_alone() {
    let wsl = FakeWsl::default();
    wsl.state.lock().unwrap().lose_import_race = true;
    let h = harness(wsl).await;

    let err = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect_err("name taken during import");

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.wsl.live(), vec!["dev1"]);
    assert!(!h.wsl.verbs().contains(&"--unregister".to_string()));
    assert!(h.layout.instance_dir("dev1").join("ext4.vhdx").is_file());
}

#[tokio::test]
async fn failed_commit_unregisters_and_removes_manifest() {
    let h = harness(FakeWsl::default()).await;
    let registry_file = h.layout.image_registry_file();
    std::fs::create_dir_all(&registry_file).expect("block registry file");
    std::fs::write(registry_file.join("occupied"), b"x").expect("occupy");

    let err = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect_err("registry write fails");

    assert_eq!(err.kind(), ErrorKind::IoFailure);
    let verbs = h.wsl.verbs();
    assert!(verbs.contains(&"--import".to_string()));
    assert!(verbs.contains(&"--unregister".to_string()));
    assert!(h.wsl.live().is_empty());
    assert!(!h.images.manifests().has("dev1").await);
    assert!(!h.layout.instance_dir("dev1").exists());
    assert!(h.images.get_image_info("dev1").await.is_none());
}

// ── Clone ──────────────────────────────────────────────────────────

#[tokio::test]
async fn clone_of_missing_source_never_touches_the_tool() {
    let h = harness(FakeWsl::default()).await;
    let err = h
        .images
        .clone_image("dev1", "dev2", ImageOptions::default())
        .await
        .expect_err("missing source");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.wsl.verbs(), vec!["--list"]);
}

#[tokio::test]
async fn clone_onto_live_target_is_rejected() {
    let h = harness(FakeWsl::with_live(&["dev1", "dev2"])).await;
    let err = h
        .images
        .clone_image("dev1", "DEV2", ImageOptions::default())
        .await
        .expect_err("target exists");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn clone_leaves_no_scratch_directory() {
    let h = harness(FakeWsl::default()).await;
    let _ = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect("create");

    let record = h
        .images
        .clone_image("dev1", "dev2", ImageOptions::default())
        .await
        .expect("clone");

    assert_eq!(record.source.as_deref(), Some("dev1"));
    assert_eq!(record.source_type, Some(SourceType::Image));
    assert_eq!(tmp_entries(&h.layout), 0);
    let exports = h.wsl.state.lock().unwrap().exports.clone();
    assert_eq!(exports.len(), 1);
    assert!(exports[0].starts_with(h.layout.tmp_dir()));
    assert!(!exports[0].exists());
}

#[tokio::test]
async fn clone_chain_builds_lineage() {
    let h = harness(FakeWsl::default()).await;
    let _ = h
        .images
        .create_from_template("ubuntu-base", "ubuntu-base", ImageOptions::default())
        .await
        .expect("create");
    let _ = h
        .images
        .clone_image("ubuntu-base", "child1", ImageOptions::default())
        .await
        .expect("clone 1");
    let _ = h
        .images
        .clone_image("child1", "child2", ImageOptions::default())
        .await
        .expect("clone 2");

    let manifest = h
        .images
        .get_image_info("child2")
        .await
        .and_then(|i| i.manifest)
        .expect("manifest");
    assert_eq!(manifest.metadata.lineage, vec!["ubuntu-base", "child1"]);
    assert_eq!(manifest.metadata.parent.as_deref(), Some("child1"));
    let ops: Vec<LayerOp> = manifest.layers.iter().map(|l| l.op).collect();
    assert_eq!(ops, vec![LayerOp::Created, LayerOp::Cloned, LayerOp::Cloned]);
    assert!(
        manifest
            .metadata
            .lineage
            .windows(2)
            .all(|w| w[0] != w[1])
    );
}

#[tokio::test]
async fn clone_of_legacy_image_starts_lineage_at_parent() {
    let h = harness(FakeWsl::with_live(&["Ubuntu"])).await;
    let _ = h
        .images
        .clone_image("ubuntu", "copy", ImageOptions::default())
        .await
        .expect("clone");

    let manifest = h
        .images
        .get_image_info("copy")
        .await
        .and_then(|i| i.manifest)
        .expect("manifest");
    assert_eq!(manifest.metadata.lineage, vec!["Ubuntu"]);
}

#[tokio::test]
async fn failed_clone_export_cleans_scratch() {
    let wsl = FakeWsl::with_live(&["dev1"]);
    wsl.state.lock().unwrap().fail_export = true;
    let h = harness(wsl).await;

    let err = h
        .images
        .clone_image("dev1", "dev2", ImageOptions::default())
        .await
        .expect_err("export fails");
    assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    assert_eq!(tmp_entries(&h.layout), 0);
    assert!(!h.wsl.verbs().contains(&"--import".to_string()));
    assert!(!h.wsl.verbs().contains(&"--unregister".to_string()));
    assert!(h.images.get_image_info("dev2").await.is_none());
}

// ── Delete, list, update ──────────────────────────────────────────

#[tokio::test]
async fn delete_removes_every_trace() {
    let h = harness(FakeWsl::default()).await;
    let _ = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect("create");

    h.images.delete_image("dev1").await.expect("delete");

    assert!(h.wsl.live().is_empty());
    assert!(!h.layout.instance_dir("dev1").exists());
    assert!(!h.images.manifests().has("dev1").await);
    assert!(h.images.get_image_info("dev1").await.is_none());
    let err = h.images.delete_image("dev1").await.expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn delete_legacy_image_without_manifest() {
    let h = harness(FakeWsl::with_live(&["legacy"])).await;
    h.images.delete_image("legacy").await.expect("delete");
    assert!(h.wsl.live().is_empty());
}

#[tokio::test]
async fn listing_adopts_but_never_evicts() {
    let h = harness(FakeWsl::with_live(&["external"])).await;
    let _ = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect("create");

    let views = h.images.list_images().await.expect("list");
    let names: Vec<&str> = views.iter().map(|v| v.record.name.as_str()).collect();
    assert_eq!(names, vec!["external", "dev1"]);
    let external = &views[0].record;
    assert!(!external.has_manifest);
    assert!(external.source.is_none());
    assert!(views[1].record.has_manifest);
    assert_eq!(views[1].state, "Stopped");

    h.wsl.forget("dev1");
    let views = h.images.list_images().await.expect("list again");
    assert_eq!(views.len(), 1);
    assert!(h.images.get_image_info("dev1").await.is_some());

    let on_disk: serde_json::Value = serde_json::from_slice(
        &std::fs::read(h.layout.image_registry_file()).expect("registry file"),
    )
    .expect("json");
    assert!(on_disk.get("dev1").is_some());
    assert!(on_disk.get("external").is_some());
}

#[tokio::test]
async fn patch_updates_only_editable_fields() {
    let h = harness(FakeWsl::default()).await;
    let created = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect("create");

    let patch: ImagePatch = serde_json::from_str(
        r#"{"displayName":"Dev box","enabled":false,"id":"forged","source":"x","sourceType":"image"}"#,
    )
    .expect("patch");
    let updated = h
        .images
        .update_image_properties("dev1", patch)
        .await
        .expect("update");

    assert_eq!(updated.display_name, "Dev box");
    assert!(!updated.enabled);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.source.as_deref(), Some("ubuntu-base"));
    assert_eq!(updated.source_type, Some(SourceType::Template));
}

#[tokio::test]
async fn patch_adopts_live_unreconciled_instance() {
    let h = harness(FakeWsl::with_live(&["Legacy"])).await;
    let updated = h
        .images
        .update_image_properties(
            "legacy",
            ImagePatch {
                description: Some("found it".to_string()),
                ..ImagePatch::default()
            },
        )
        .await
        .expect("adopt and update");
    assert_eq!(updated.name, "Legacy");
    assert_eq!(updated.description, "found it");
    assert!(!updated.has_manifest);

    let err = h
        .images
        .update_image_properties("ghost", ImagePatch::default())
        .await
        .expect_err("unknown");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn registry_survives_reopen() {
    let h = harness(FakeWsl::default()).await;
    let created = h
        .images
        .create_from_template("ubuntu-base", "dev1", ImageOptions::default())
        .await
        .expect("create");

    let catalog = DistroCatalogManager::open(h.layout.clone(), Vec::new()).await;
    let tool = WslTool::new(Arc::clone(&h.wsl) as Arc<dyn CommandRunner>);
    let reopened = ImageLifecycleManager::open(h.layout.clone(), tool, Arc::new(catalog)).await;
    let info = reopened.get_image_info("DEV1").await.expect("persisted");
    assert_eq!(info.record.id, created.id);
}
