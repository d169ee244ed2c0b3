use super::*;
use anyhow::Result;
use forkman_core::{ForkError, ForksLayout};
use forkman_vcs::{IntegrateOutcome, Vcs};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[test]
fn list_returns_only_directories_with_repositories_sorted_by_name() {
    let layout = test_layout();
    seed_nested_variant(&layout, "zeta");
    seed_flat_variant(&layout, "alpha");
    seed_nested_variant(&layout, "beta");
    fs::create_dir_all(layout.variant_root("empty")).expect("must create empty dir");
    fs::create_dir_all(layout.tmp_dir().join("openpilot").join(".git"))
        .expect("must create tmp dir");
    fs::write(layout.forks_root().join("current_fork"), "alpha\n").expect("must write file");

    let registry = VariantRegistry::new(layout.clone());
    let listed = registry.list().expect("must list variants");
    let names: Vec<&str> = listed.iter().map(|variant| variant.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "zeta"]);

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn list_on_missing_root_is_empty() {
    let registry = VariantRegistry::new(test_layout());
    assert!(registry.list().expect("must list").is_empty());
}

#[test]
fn resolve_repo_path_prefers_nested_layout_then_variant_root() {
    let layout = test_layout();
    seed_nested_variant(&layout, "nested");
    seed_flat_variant(&layout, "flat");
    let registry = VariantRegistry::new(layout.clone());

    assert_eq!(
        registry.resolve_repo_path("nested").expect("must resolve"),
        layout.variant_root("nested").join("openpilot")
    );
    assert_eq!(
        registry.resolve_repo_path("flat").expect("must resolve"),
        layout.variant_root("flat")
    );

    let err = registry
        .resolve_repo_path("ghost")
        .expect_err("missing variant must not resolve");
    assert_eq!(
        err.downcast_ref::<ForkError>(),
        Some(&ForkError::NotFound {
            name: "ghost".to_string()
        })
    );

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn resolve_repo_path_honors_recorded_repo_dir() {
    let layout = test_layout();
    let root = layout.variant_root("custom");
    fs::create_dir_all(root.join("src").join(".git")).expect("must create repo");
    fs::create_dir_all(root.join("openpilot").join(".git")).expect("must create decoy");
    write_metadata(
        &layout,
        &VariantMetadata {
            repo_dir: Some("src".to_string()),
            ..VariantMetadata::new("custom", "https://example.invalid/custom.git", "")
        },
    )
    .expect("must write metadata");

    let registry = VariantRegistry::new(layout.clone());
    assert_eq!(
        registry.resolve_repo_path("custom").expect("must resolve"),
        root.join("src")
    );

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn create_clones_into_nested_layout_and_records_metadata() {
    let layout = test_layout();
    let registry = VariantRegistry::new(layout.clone());
    let vcs = FakeVcs::default();

    let variant = registry
        .create("frog", "https://example.invalid/frog.git", " dev ", &vcs)
        .expect("must create variant");
    assert_eq!(variant.repo_path, layout.variant_root("frog").join("openpilot"));
    assert!(variant.repo_path.join(".git").is_dir());

    let metadata = read_metadata(&layout, "frog")
        .expect("must read metadata")
        .expect("metadata should exist");
    assert_eq!(metadata.url, "https://example.invalid/frog.git");
    assert_eq!(metadata.branch, "dev");
    assert_eq!(metadata.branch(), Some("dev"));
    assert_eq!(metadata.repo_dir.as_deref(), Some("openpilot"));

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn create_rejects_existing_directory() {
    let layout = test_layout();
    seed_nested_variant(&layout, "frog");
    let registry = VariantRegistry::new(layout.clone());

    let err = registry
        .create("frog", "https://example.invalid/frog.git", "", &FakeVcs::default())
        .expect_err("existing directory must be rejected");
    assert_eq!(
        err.downcast_ref::<ForkError>(),
        Some(&ForkError::AlreadyExists {
            name: "frog".to_string()
        })
    );

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn create_reports_clone_failure_with_url_and_branch_and_leaves_no_directory() {
    let layout = test_layout();
    let registry = VariantRegistry::new(layout.clone());
    let vcs = FakeVcs {
        fail_clone: true,
    };

    let err = registry
        .create("frog", "https://example.invalid/frog.git", "release", &vcs)
        .expect_err("clone failure must surface");
    match err.downcast_ref::<ForkError>() {
        Some(ForkError::CloneFailed { url, branch, .. }) => {
            assert_eq!(url, "https://example.invalid/frog.git");
            assert_eq!(branch, "release");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!layout.variant_root("frog").exists());

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn create_rejects_invalid_name_before_touching_disk() {
    let layout = test_layout();
    let registry = VariantRegistry::new(layout.clone());
    let err = registry
        .create("../escape", "https://example.invalid/x.git", "", &FakeVcs::default())
        .expect_err("invalid name must be rejected");
    assert!(matches!(
        err.downcast_ref::<ForkError>(),
        Some(ForkError::InvalidName { .. })
    ));
    assert!(!layout.forks_root().exists());
}

#[test]
fn remove_refuses_active_variant_and_keeps_directory() {
    let layout = test_layout();
    seed_nested_variant(&layout, "alpha");
    let registry = VariantRegistry::new(layout.clone());

    let err = registry
        .remove("alpha", Some("alpha"))
        .expect_err("active variant must not be removed");
    assert_eq!(
        err.downcast_ref::<ForkError>(),
        Some(&ForkError::IsActive {
            name: "alpha".to_string()
        })
    );
    assert!(registry.exists("alpha"));

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn remove_deletes_inactive_variant_and_reports_missing_ones() {
    let layout = test_layout();
    seed_nested_variant(&layout, "alpha");
    seed_nested_variant(&layout, "beta");
    let registry = VariantRegistry::new(layout.clone());

    registry
        .remove("beta", Some("alpha"))
        .expect("inactive variant must be removed");
    assert!(!layout.variant_root("beta").exists());

    let err = registry
        .remove("beta", Some("alpha"))
        .expect_err("second removal must fail");
    assert!(matches!(
        err.downcast_ref::<ForkError>(),
        Some(ForkError::NotFound { .. })
    ));

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn rename_moves_variant_and_rewrites_metadata_name() {
    let layout = test_layout();
    let registry = VariantRegistry::new(layout.clone());
    registry
        .create("old", "https://example.invalid/old.git", "", &FakeVcs::default())
        .expect("must create variant");

    let renamed = registry
        .rename("old", "older", Some("other"))
        .expect("must rename variant");
    assert_eq!(renamed.name, "older");
    assert!(!layout.variant_root("old").exists());
    assert_eq!(
        renamed.metadata.expect("metadata should move along").name,
        "older"
    );

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn rename_refuses_active_and_existing_targets() {
    let layout = test_layout();
    seed_nested_variant(&layout, "alpha");
    seed_nested_variant(&layout, "beta");
    let registry = VariantRegistry::new(layout.clone());

    let err = registry
        .rename("alpha", "gamma", Some("alpha"))
        .expect_err("active variant must not move");
    assert!(matches!(
        err.downcast_ref::<ForkError>(),
        Some(ForkError::IsActive { .. })
    ));

    let err = registry
        .rename("alpha", "beta", None)
        .expect_err("existing target must be rejected");
    assert!(matches!(
        err.downcast_ref::<ForkError>(),
        Some(ForkError::AlreadyExists { .. })
    ));

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn variant_for_path_maps_resolved_paths_to_registered_names() {
    let layout = test_layout();
    seed_nested_variant(&layout, "alpha");
    let registry = VariantRegistry::new(layout.clone());

    let repo = fs::canonicalize(layout.variant_root("alpha").join("openpilot"))
        .expect("must canonicalize repo");
    assert_eq!(registry.variant_for_path(&repo).as_deref(), Some("alpha"));
    assert_eq!(registry.variant_for_path(Path::new("/elsewhere")), None);

    fs::create_dir_all(layout.variant_root("bare")).expect("must create dir");
    let bare = fs::canonicalize(layout.variant_root("bare")).expect("must canonicalize");
    assert_eq!(registry.variant_for_path(&bare), None);

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn metadata_without_branch_field_defaults_to_remote_default() {
    let layout = test_layout();
    fs::create_dir_all(layout.variant_root("legacy")).expect("must create dir");
    fs::write(
        layout.metadata_path("legacy"),
        r#"{"name":"legacy","url":"https://example.invalid/legacy.git"}"#,
    )
    .expect("must write metadata");

    let metadata = read_metadata(&layout, "legacy")
        .expect("must parse legacy metadata")
        .expect("metadata should exist");
    assert_eq!(metadata.branch(), None);
    assert_eq!(metadata.repo_dir, None);

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[test]
fn unreadable_metadata_keeps_variant_visible_and_manageable() {
    let layout = test_layout();
    seed_nested_variant(&layout, "alpha");
    seed_nested_variant(&layout, "beta");
    fs::write(layout.metadata_path("beta"), "{not json").expect("must write metadata");
    let registry = VariantRegistry::new(layout.clone());

    let names: Vec<String> = registry
        .list()
        .expect("must list variants")
        .into_iter()
        .map(|variant| variant.name)
        .collect();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);

    let beta = registry.get("beta").expect("damaged metadata must not hide variant");
    assert_eq!(beta.metadata, None);
    assert_eq!(beta.repo_path, layout.variant_root("beta").join("openpilot"));
    assert!(registry.exists("beta"));

    let renamed = registry
        .rename("beta", "gamma", Some("alpha"))
        .expect("must rename despite damaged metadata");
    assert_eq!(renamed.metadata, None);
    registry
        .remove("gamma", Some("alpha"))
        .expect("must remove despite damaged metadata");
    assert!(!layout.variant_root("gamma").exists());

    let _ = fs::remove_dir_all(layout.forks_root());
}

#[derive(Debug, Default)]
struct FakeVcs {
    fail_clone: bool,
}

impl Vcs for FakeVcs {
    fn is_available(&self) -> bool {
        true
    }

    fn is_repository(&self, repo: &Path) -> bool {
        repo.join(".git").exists()
    }

    fn clone_repo(&self, url: &str, _branch: Option<&str>, destination: &Path) -> Result<()> {
        if self.fail_clone {
            anyhow::bail!("remote {url} unreachable");
        }
        fs::create_dir_all(destination.join(".git"))?;
        Ok(())
    }

    fn fetch(&self, _repo: &Path, _branch: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn local_commit(&self, _repo: &Path) -> Result<String> {
        Ok("0000000".to_string())
    }

    fn remote_commit(&self, _repo: &Path, _branch: Option<&str>) -> Result<String> {
        Ok("0000000".to_string())
    }

    fn has_local_changes(&self, _repo: &Path) -> Result<bool> {
        Ok(false)
    }

    fn integrate(&self, _repo: &Path) -> Result<IntegrateOutcome> {
        Ok(IntegrateOutcome::Integrated)
    }
}

fn seed_nested_variant(layout: &ForksLayout, name: &str) {
    fs::create_dir_all(layout.variant_root(name).join("openpilot").join(".git"))
        .expect("must create nested repo");
}

fn seed_flat_variant(layout: &ForksLayout, name: &str) {
    fs::create_dir_all(layout.variant_root(name).join(".git")).expect("must create flat repo");
}

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_layout() -> ForksLayout {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::SeqCst);
    path.push(format!(
        "forkman-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    let link: PathBuf = path.join("active");
    ForksLayout::new(path.join("forks"), link)
}
