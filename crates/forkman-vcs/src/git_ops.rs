use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use forkman_core::{is_interrupted, ForkError};
use tracing::debug;

use crate::{IntegrateOutcome, Vcs};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn base_git_command() -> Command {
    let mut command = Command::new("git");
    command
        .arg("-c")
        .arg("core.autocrlf=false")
        .arg("-c")
        .arg("core.eol=lf")
        .env("GIT_TERMINAL_PROMPT", "0");
    command
}

/// `Vcs` backed by the `git` executable. Network queries (`ls-remote`,
/// `fetch`) are killed once `network_timeout` elapses.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    network_timeout: Option<Duration>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network_timeout(timeout: Duration) -> Self {
        Self {
            network_timeout: Some(timeout),
        }
    }

    fn run(&self, repo: &Path, args: &[&str], timeout: Option<Duration>) -> Result<Output> {
        debug!(repo = %repo.display(), "git {}", args.join(" "));
        let mut command = base_git_command();
        command.args(args).current_dir(repo);
        match timeout {
            None => command
                .output()
                .with_context(|| format!("failed launching git {}", args.join(" "))),
            Some(timeout) => {
                let child = command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .with_context(|| format!("failed launching git {}", args.join(" ")))?;
                wait_with_timeout(child, timeout, args)
            }
        }
    }

    fn run_checked(&self, repo: &Path, args: &[&str], timeout: Option<Duration>) -> Result<String> {
        let output = self.run(repo, args, timeout)?;
        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        String::from_utf8(output.stdout)
            .with_context(|| format!("git {} produced non-UTF-8 output", args.join(" ")))
    }
}

impl Vcs for GitCli {
    fn is_available(&self) -> bool {
        base_git_command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn is_repository(&self, repo: &Path) -> bool {
        if !repo.join(".git").exists() {
            return false;
        }
        self.run(repo, &["rev-parse", "--git-dir"], None)
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn clone_repo(&self, url: &str, branch: Option<&str>, destination: &Path) -> Result<()> {
        let mut command = base_git_command();
        command.arg("clone").arg("--recurse-submodules");
        if let Some(branch) = branch {
            command.arg("--branch").arg(branch);
        }
        command.arg("--").arg(url).arg(destination);
        debug!(url, destination = %destination.display(), "git clone");

        let output = command
            .output()
            .with_context(|| format!("failed launching git clone for {url}"))?;
        if !output.status.success() {
            anyhow::bail!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn fetch(&self, repo: &Path, branch: Option<&str>) -> Result<()> {
        let mut args = vec!["fetch", "--quiet", "origin"];
        if let Some(branch) = branch {
            args.push(branch);
        }
        self.run_checked(repo, &args, self.network_timeout)?;
        Ok(())
    }

    fn local_commit(&self, repo: &Path) -> Result<String> {
        let raw = self.run_checked(repo, &["rev-parse", "HEAD"], None)?;
        normalize_commit(&raw)
    }

    fn remote_commit(&self, repo: &Path, branch: Option<&str>) -> Result<String> {
        let reference = match branch {
            Some(branch) => format!("refs/heads/{branch}"),
            None => "HEAD".to_string(),
        };
        let raw = self.run_checked(
            repo,
            &["ls-remote", "origin", reference.as_str()],
            self.network_timeout,
        )?;
        let Some(line) = raw.lines().find(|line| !line.trim().is_empty()) else {
            anyhow::bail!("remote has no ref '{reference}'");
        };
        let commit = line.split_whitespace().next().unwrap_or_default();
        normalize_commit(commit)
    }

    fn has_local_changes(&self, repo: &Path) -> Result<bool> {
        let raw = self.run_checked(
            repo,
            &["status", "--porcelain", "--untracked-files=no"],
            None,
        )?;
        Ok(!raw.trim().is_empty())
    }

    fn integrate(&self, repo: &Path) -> Result<IntegrateOutcome> {
        let output = self.run(repo, &["rebase", "--autostash", "FETCH_HEAD"], None)?;
        if output.status.success() {
            return Ok(IntegrateOutcome::Integrated);
        }

        let git_dir = repo.join(".git");
        if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            let _ = self.run(repo, &["rebase", "--abort"], None);
            return Ok(IntegrateOutcome::Conflict);
        }
        anyhow::bail!(
            "git rebase --autostash FETCH_HEAD failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )
    }
}

fn normalize_commit(raw: &str) -> Result<String> {
    let commit = raw.trim();
    if commit.len() < 7 || !commit.chars().all(|ch| ch.is_ascii_hexdigit()) {
        anyhow::bail!("git returned an invalid commit id: '{commit}'");
    }
    Ok(commit.to_ascii_lowercase())
}

pub(crate) fn abort_reason(interrupted: bool, timeout: Duration, args: &[&str]) -> anyhow::Error {
    if interrupted {
        return ForkError::Interrupted.into();
    }
    anyhow::anyhow!(
        "git {} did not finish within {}s",
        args.join(" "),
        timeout.as_secs()
    )
}

fn wait_with_timeout(mut child: Child, timeout: Duration, args: &[&str]) -> Result<Output> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed waiting on git {}", args.join(" ")))?
        {
            break status;
        }
        let interrupted = is_interrupted();
        if interrupted || Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(abort_reason(interrupted, timeout, args));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    buffer
}
