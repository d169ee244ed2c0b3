use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn clone_then_remote_commit_matches_local_head() {
    let root = test_root();
    let remote = init_remote_with_commit(&root);
    let clone = root.join("clone");
    let git = GitCli::with_network_timeout(Duration::from_secs(30));

    git.clone_repo(path_str(&remote), None, &clone)
        .expect("must clone local remote");
    assert!(git.is_repository(&clone));

    let local = git.local_commit(&clone).expect("must read local head");
    let remote_head = git
        .remote_commit(&clone, None)
        .expect("must read remote default head");
    assert_eq!(local, remote_head);
    let remote_main = git
        .remote_commit(&clone, Some("main"))
        .expect("must read remote main head");
    assert_eq!(local, remote_main);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn remote_commit_sees_new_upstream_head_without_touching_local_repo() {
    let root = test_root();
    let remote = init_remote_with_commit(&root);
    let clone = root.join("clone");
    let git = GitCli::new();
    git.clone_repo(path_str(&remote), Some("main"), &clone)
        .expect("must clone local remote");
    let before = git.local_commit(&clone).expect("must read local head");

    push_upstream_commit(&root, &remote, "second.txt");

    let remote_head = git
        .remote_commit(&clone, Some("main"))
        .expect("must read remote head");
    assert_ne!(before, remote_head);
    assert_eq!(git.local_commit(&clone).expect("must read head"), before);

    git.fetch(&clone, Some("main")).expect("must fetch");
    assert_eq!(
        git.integrate(&clone).expect("must integrate"),
        IntegrateOutcome::Integrated
    );
    assert_eq!(git.local_commit(&clone).expect("must read head"), remote_head);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn has_local_changes_reports_modified_tracked_files() {
    let root = test_root();
    let remote = init_remote_with_commit(&root);
    let clone = root.join("clone");
    let git = GitCli::new();
    git.clone_repo(path_str(&remote), None, &clone)
        .expect("must clone local remote");

    assert!(!git.has_local_changes(&clone).expect("must read status"));
    fs::write(clone.join("README.md"), "edited\n").expect("must edit tracked file");
    assert!(git.has_local_changes(&clone).expect("must read status"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn clone_of_missing_remote_fails_with_git_stderr() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let git = GitCli::new();
    let err = git
        .clone_repo(path_str(&root.join("nope.git")), None, &root.join("dest"))
        .expect_err("clone of missing remote must fail");
    assert!(err.to_string().contains("git clone failed"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn is_repository_rejects_plain_directory() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    assert!(!GitCli::new().is_repository(&root));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn killed_git_reports_interrupt_separately_from_timeout() {
    let interrupted = git_ops::abort_reason(true, Duration::from_secs(30), &["fetch", "origin"]);
    assert_eq!(
        interrupted.downcast_ref::<forkman_core::ForkError>(),
        Some(&forkman_core::ForkError::Interrupted)
    );

    let timed_out = git_ops::abort_reason(false, Duration::from_secs(30), &["fetch", "origin"]);
    assert!(timed_out.downcast_ref::<forkman_core::ForkError>().is_none());
    assert_eq!(
        timed_out.to_string(),
        "git fetch origin did not finish within 30s"
    );
}

fn init_remote_with_commit(root: &Path) -> PathBuf {
    let remote = root.join("remote.git");
    let seed = root.join("seed");
    fs::create_dir_all(&remote).expect("must create remote dir");
    fs::create_dir_all(&seed).expect("must create seed dir");

    run_git(&remote, &["init", "--bare", "--quiet"]);
    run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    run_git(&seed, &["init", "--quiet"]);
    fs::write(seed.join("README.md"), "seed\n").expect("must write seed file");
    run_git(&seed, &["add", "README.md"]);
    run_git(&seed, &["commit", "--quiet", "-m", "seed"]);
    run_git(&seed, &["branch", "-M", "main"]);
    run_git(&seed, &["remote", "add", "origin", path_str(&remote)]);
    run_git(&seed, &["push", "--quiet", "origin", "main"]);
    remote
}

fn push_upstream_commit(root: &Path, remote: &Path, file_name: &str) {
    let seed = root.join("seed");
    fs::write(seed.join(file_name), "more\n").expect("must write upstream file");
    run_git(&seed, &["add", file_name]);
    run_git(&seed, &["commit", "--quiet", "-m", file_name]);
    run_git(&seed, &["push", "--quiet", "origin", "main"]);
    assert!(remote.exists());
}

fn run_git(cwd: &Path, args: &[&str]) {
    let output = base_git_command()
        .args(args)
        .current_dir(cwd)
        .env("GIT_AUTHOR_NAME", "forkman")
        .env("GIT_AUTHOR_EMAIL", "forkman@example.invalid")
        .env("GIT_COMMITTER_NAME", "forkman")
        .env("GIT_COMMITTER_EMAIL", "forkman@example.invalid")
        .output()
        .expect("git must launch");
    assert!(
        output.status.success(),
        "git command failed: git {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("test paths are UTF-8")
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
        "forkman-vcs-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    path
}
