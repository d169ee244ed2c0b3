mod command;
mod fetch;
mod prompt;
mod render;
mod shell;
mod signals;

use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use forkman_core::{init_logging, ForkError, ForkmanConfig, ForksLayout, RetryPolicy};
use forkman_registry::VariantRegistry;
use forkman_switch::{ActivePointerController, FsPointerStore};
use forkman_vcs::{GitCli, Vcs};
use nix::unistd::Uid;
use tracing::{error, info};

use crate::fetch::HttpScriptSource;
use crate::prompt::StdinPrompter;
use crate::render::current_output_style;
use crate::shell::{Shell, ShellExit, ShellOptions};

#[derive(Parser, Debug)]
#[command(name = "forkman")]
#[command(about = "Keeps several forks of the driving software side by side", long_about = None)]
struct Cli {
    /// Log at debug level, with timestamps, mirrored to stderr.
    #[arg(short, long)]
    verbose: bool,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let config = ForkmanConfig::load(cli.config.as_deref())?;
    if config.require_root && !Uid::effective().is_root() {
        return Err(ForkError::PrivilegeRequired.into());
    }
    let layout = ForksLayout::from_config(&config);
    init_logging(layout.log_path(), config.log_max_bytes, cli.verbose)?;
    info!(forks_root = %layout.forks_root().display(), "forkman starting");

    let vcs = GitCli::with_network_timeout(config.network_timeout());
    if !vcs.is_available() {
        return Err(ForkError::MissingCapability {
            name: "git".to_string(),
        }
        .into());
    }
    signals::install_handlers()?;

    layout.ensure_base_dirs()?;
    let controller = ActivePointerController::new(
        VariantRegistry::new(layout.clone()),
        FsPointerStore::new(layout),
        vcs,
    )
    .with_retry(RetryPolicy::new(config.retry_attempts, config.retry_delay()));
    controller.sweep_transient()?;

    let executable = std::env::current_exe().context("failed to locate the running executable")?;
    let scripts = HttpScriptSource::new(config.network_timeout())?;
    let mut prompter = StdinPrompter::new();
    let mut stdout = io::stdout();
    let options = ShellOptions {
        update_check_workers: config.update_check_workers,
        self_update_url: config.self_update_url.clone(),
        executable: executable.clone(),
        style: current_output_style(),
    };

    let mut shell = Shell::new(&controller, &mut prompter, &scripts, &mut stdout, options);
    shell.ensure_initialized()?;
    match shell.run()? {
        ShellExit::Quit => {
            info!("exiting");
            Ok(())
        }
        ShellExit::Restart => restart(&executable),
    }
}

/// Replaces this process with the freshly installed executable.
fn restart(executable: &Path) -> Result<()> {
    info!(path = %executable.display(), "re-executing after self update");
    let err = Command::new(executable)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).with_context(|| format!("failed to re-execute {}", executable.display()))
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ForkError>() {
        Some(ForkError::Interrupted) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}
