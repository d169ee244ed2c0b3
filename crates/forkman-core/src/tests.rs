use super::*;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn validate_variant_name_accepts_letters_digits_dash_and_underscore() {
    for name in ["alpha", "FrogPilot", "fork_2", "a-b_c-9", "0", "-", "_"] {
        validate_variant_name(name).expect("must accept valid name");
    }
}

#[test]
fn validate_variant_name_rejects_empty_and_foreign_characters() {
    for name in ["", "bad name", "dot.name", "slash/name", "tab\tname", "ümlaut", "a:b"] {
        let err = validate_variant_name(name).expect_err("must reject invalid name");
        assert_eq!(
            err,
            ForkError::InvalidName {
                name: name.to_string()
            }
        );
    }
}

#[test]
fn config_defaults_match_device_layout() {
    let config = ForkmanConfig::default();
    assert_eq!(config.forks_root, PathBuf::from("/data/forks"));
    assert_eq!(config.active_link, PathBuf::from("/data/openpilot"));
    assert_eq!(config.retry_attempts, 3);
    assert!(config.require_root);
}

#[test]
fn config_parse_overrides_only_given_fields() {
    let config = ForkmanConfig::parse(
        r#"
forks_root = "/tmp/forks"
retry_attempts = 5
self_update_url = "https://example.invalid/forkman"
"#,
    )
    .expect("must parse config");
    assert_eq!(config.forks_root, PathBuf::from("/tmp/forks"));
    assert_eq!(config.retry_attempts, 5);
    assert_eq!(
        config.self_update_url.as_deref(),
        Some("https://example.invalid/forkman")
    );
    assert_eq!(config.active_link, PathBuf::from("/data/openpilot"));
}

#[test]
fn config_parse_rejects_unknown_fields_and_zero_attempts() {
    let err = ForkmanConfig::parse("forks_rot = \"/x\"\n").expect_err("must reject typo");
    assert!(err.to_string().contains("unknown field"));

    let err = ForkmanConfig::parse("retry_attempts = 0\n").expect_err("must reject zero");
    assert!(err.to_string().contains("retry_attempts"));
}

#[test]
fn layout_derives_variant_paths_from_root() {
    let layout = ForksLayout::new("/data/forks", "/data/openpilot");
    assert_eq!(
        layout.metadata_path("alpha"),
        PathBuf::from("/data/forks/alpha/fork.json")
    );
    assert_eq!(
        layout.state_backup_dir("alpha"),
        PathBuf::from("/data/forks/alpha/state-backup")
    );
    assert_eq!(
        layout.repo_candidates("alpha"),
        [
            PathBuf::from("/data/forks/alpha/openpilot"),
            PathBuf::from("/data/forks/alpha")
        ]
    );
    assert_eq!(
        layout.displaced_link_path(42),
        PathBuf::from("/data/openpilot.displaced-42")
    );
}

#[test]
fn retry_returns_first_success_without_exhausting_attempts() {
    let policy = RetryPolicy::new(3, Duration::ZERO);
    let mut calls = 0;
    let value = policy
        .run("probe", |attempt| {
            calls += 1;
            if attempt < 2 {
                anyhow::bail!("transient");
            }
            Ok(attempt)
        })
        .expect("second attempt must succeed");
    assert_eq!(value, 2);
    assert_eq!(calls, 2);
}

#[test]
fn retry_reports_exhaustion_with_last_error() {
    let policy = RetryPolicy::new(2, Duration::ZERO);
    let mut calls = 0;
    let err = policy
        .run("clone", |attempt| -> anyhow::Result<()> {
            calls += 1;
            anyhow::bail!("network down #{attempt}")
        })
        .expect_err("must exhaust");
    assert_eq!(calls, 2);
    let fork_err = err.downcast_ref::<ForkError>().expect("must be ForkError");
    assert_eq!(
        fork_err,
        &ForkError::RetriesExhausted {
            operation: "clone".to_string(),
            attempts: 2,
            last_error: "network down #2".to_string(),
        }
    );
    assert!(fork_err.is_fatal());
}

#[test]
fn rotation_moves_oversized_log_to_old_sibling_on_next_write() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let log_path = root.join("forkman.log");
    let sink = RotatingLogFile::new(&log_path, 64);

    let first = "x".repeat(60);
    {
        let mut writer = sink.open_writer().expect("must open writer");
        writer.write_all(first.as_bytes()).expect("must write");
        writer.write_all(b"0123456789\n").expect("must write");
    }
    assert!(!rotated_log_path(&log_path).exists(), "no rotation mid-write");

    {
        let mut writer = sink.open_writer().expect("must open writer");
        writer.write_all(b"fresh line\n").expect("must write");
    }
    let rotated = fs::read_to_string(rotated_log_path(&log_path)).expect("must read old log");
    assert_eq!(rotated, format!("{first}0123456789\n"));
    let current = fs::read_to_string(&log_path).expect("must read log");
    assert_eq!(current, "fresh line\n");

    {
        let mut writer = sink.open_writer().expect("must open writer");
        writer.write_all(b"second\n").expect("must write");
    }
    let current = fs::read_to_string(&log_path).expect("must read log");
    assert_eq!(current, "fresh line\nsecond\n", "exactly one rotation");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rotate_if_needed_ignores_missing_file() {
    let root = test_root();
    let rotated = rotate_if_needed(&root.join("absent.log"), 1).expect("must not fail");
    assert!(!rotated);
}

#[test]
fn sha256_hex_matches_known_digest() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    path.push(format!(
        "forkman-core-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    path
}
