use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use forkman_core::{is_interrupted, validate_variant_name, ForkError};
use forkman_switch::{
    apply_self_update, check_all, check_self, update_variant, ActivePointerController, PointerStore,
    ScriptSource, SelfUpdateOutcome, SelfUpdateStatus, SetupRequest, SwitchOutcome, VariantUpdate,
};
use forkman_vcs::Vcs;
use tracing::{error, info, warn};

use crate::command::MenuCommand;
use crate::prompt::{ask_required, confirm, Prompter};
use crate::render::{
    format_variant_lines, menu_help_line, render_section_header, render_status_line, OutputStyle,
    Spinner,
};

const MENU_PROMPT: &str = "forkman> ";

#[derive(Debug, Clone)]
pub struct ShellOptions {
    pub update_check_workers: usize,
    pub self_update_url: Option<String>,
    pub executable: PathBuf,
    pub style: OutputStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    Quit,
    /// The executable was replaced and should be started again.
    Restart,
}

/// Interactive session over one controller. Fatal errors are returned to the
/// caller; everything else is logged, echoed and the menu comes back.
pub struct Shell<'a, S: PointerStore, V: Vcs> {
    controller: &'a ActivePointerController<S, V>,
    prompter: &'a mut dyn Prompter,
    scripts: &'a dyn ScriptSource,
    out: &'a mut dyn Write,
    options: ShellOptions,
}

impl<'a, S: PointerStore, V: Vcs> Shell<'a, S, V> {
    pub fn new(
        controller: &'a ActivePointerController<S, V>,
        prompter: &'a mut dyn Prompter,
        scripts: &'a dyn ScriptSource,
        out: &'a mut dyn Write,
        options: ShellOptions,
    ) -> Self {
        Self {
            controller,
            prompter,
            scripts,
            out,
            options,
        }
    }

    /// Runs the initial-setup dialog when no variant is active.
    ///
    /// A setup failure is fatal when nothing else could be served.
    pub fn ensure_initialized(&mut self) -> Result<()> {
        if self.controller.verify()?.active_name().is_some() {
            return Ok(());
        }

        self.say("warn", "no active fork is configured; set one up")?;
        loop {
            let request = self.prompt_setup_request()?;
            match self.controller.initial_setup(&request) {
                Ok(report) => {
                    let name = report.active_name().unwrap_or(request.name.as_str());
                    self.say("ok", &format!("active fork: {name}"))?;
                    return Ok(());
                }
                Err(err) => {
                    if is_fatal(&err) || !self.controller.has_variants()? {
                        return Err(err.context("initial setup failed"));
                    }
                    self.report(&err)?;
                }
            }
        }
    }

    pub fn run(&mut self) -> Result<ShellExit> {
        self.announce_self_update()?;
        loop {
            if is_interrupted() {
                return Err(ForkError::Interrupted.into());
            }
            self.show_variants()?;

            let Some(line) = self.prompter.read_line(MENU_PROMPT)? else {
                return Ok(ShellExit::Quit);
            };
            let command = match MenuCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    self.report(&err)?;
                    continue;
                }
            };

            match self.dispatch(command) {
                Ok(Some(exit)) => return Ok(exit),
                Ok(None) => {}
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => self.report(&err)?,
            }
        }
    }

    fn dispatch(&mut self, command: MenuCommand) -> Result<Option<ShellExit>> {
        match command {
            MenuCommand::Switch(name) => self.switch(&name)?,
            MenuCommand::Clone => self.clone_variant()?,
            MenuCommand::Delete => self.delete_variant()?,
            MenuCommand::UpdateVariant(name) => self.update_variant(&name)?,
            MenuCommand::UpdateScript => return self.update_script(),
            MenuCommand::Exit => return Ok(Some(ShellExit::Quit)),
        }
        Ok(None)
    }

    fn show_variants(&mut self) -> Result<()> {
        let report = self.controller.verify()?;
        let variants = self.controller.registry().list()?;
        let spinner = Spinner::start(self.options.style, "checking for updates");
        let statuses = check_all(
            &variants,
            self.controller.vcs(),
            self.options.update_check_workers,
        );
        spinner.finish();

        if let Some(header) = render_section_header(self.options.style, "forks") {
            writeln!(self.out, "{header}")?;
        }
        for line in format_variant_lines(
            &variants,
            &statuses,
            report.active_name(),
            self.options.style,
        ) {
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out, "{}", menu_help_line())?;
        Ok(())
    }

    fn switch(&mut self, name: &str) -> Result<()> {
        match self.controller.switch_to(name)? {
            SwitchOutcome::AlreadyActive { name } => {
                self.say("info", &format!("{name} is already active"))
            }
            SwitchOutcome::Switched { to, backed_up, .. } => {
                if !backed_up {
                    self.say("warn", "no runtime state was found to back up")?;
                }
                self.say("ok", &format!("switched to {to}"))
            }
        }
    }

    fn clone_variant(&mut self) -> Result<()> {
        let Some(name) = self.ask_name("name for the new fork: ")? else {
            return Ok(());
        };
        let Some(url) = ask_required(self.prompter, "repository URL: ")? else {
            return Ok(());
        };
        let branch = self
            .prompter
            .read_line("branch (empty for the default branch): ")?
            .unwrap_or_default();

        if self.controller.registry().exists(&name) && !self.resolve_collision(&name)? {
            return self.say("info", "clone aborted");
        }

        let spinner = Spinner::start(self.options.style, &format!("cloning {name}"));
        let result = self.controller.clone_variant(&name, &url, branch.trim());
        spinner.finish();
        let variant = result?;
        self.say(
            "ok",
            &format!("cloned {}; type its name to switch to it", variant.name),
        )
    }

    /// Returns `false` when the operator gives up on the clone.
    fn resolve_collision(&mut self, name: &str) -> Result<bool> {
        let choice = self
            .prompter
            .read_line(&format!(
                "{name} already exists: [o]verwrite, [r]ename the existing one, or [a]bort? "
            ))?
            .unwrap_or_default();

        match choice.trim().to_ascii_lowercase().as_str() {
            "o" | "overwrite" => {
                self.controller.delete(name)?;
                info!(variant = name, "removed existing variant before overwrite");
                Ok(true)
            }
            "r" | "rename" => {
                let Some(new_name) = self.ask_name(&format!("new name for the existing {name}: "))?
                else {
                    return Ok(false);
                };
                let renamed = self.controller.rename(name, &new_name)?;
                self.say("ok", &format!("renamed {name} to {}", renamed.name))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_variant(&mut self) -> Result<()> {
        let Some(name) = self.ask_name("fork to delete: ")? else {
            return Ok(());
        };
        self.controller.registry().get(&name)?;
        if !confirm(
            self.prompter,
            &format!("delete {name} permanently? [y/N] "),
        )? {
            return self.say("info", "nothing deleted");
        }
        self.controller.delete(&name)?;
        self.say("ok", &format!("deleted {name}"))
    }

    fn update_variant(&mut self, name: &str) -> Result<()> {
        let mut prompt_error = None;
        let prompter = &mut *self.prompter;
        let outcome = update_variant(
            self.controller.registry(),
            self.controller.vcs(),
            name,
            |variant| {
                let question = format!(
                    "{} has local changes; they will be stashed and reapplied. continue? [y/N] ",
                    variant.name
                );
                confirm(prompter, &question).unwrap_or_else(|err| {
                    prompt_error = Some(err);
                    false
                })
            },
        );
        if let Some(err) = prompt_error {
            return Err(err);
        }

        match outcome? {
            VariantUpdate::Updated { from, to } => {
                self.say("ok", &format!("updated {name} {from} -> {to}"))
            }
            VariantUpdate::AlreadyCurrent => self.say("info", &format!("{name} is up to date")),
            VariantUpdate::Declined => self.say("info", &format!("{name} left unchanged")),
        }
    }

    /// One comparison per session; an unreachable reference copy is only logged.
    fn announce_self_update(&mut self) -> Result<()> {
        let Some(url) = self.options.self_update_url.clone() else {
            return Ok(());
        };
        let status = std::fs::read(&self.options.executable)
            .with_context(|| format!("failed to read {}", self.options.executable.display()))
            .and_then(|current| check_self(&current, &url, self.scripts));
        match status {
            Ok(SelfUpdateStatus::UpdateAvailable) => self.say(
                "info",
                "a newer forkman is available; run 'update script' to install it",
            ),
            Ok(SelfUpdateStatus::UpToDate) => Ok(()),
            Err(err) => {
                warn!("self update check skipped: {err:#}");
                Ok(())
            }
        }
    }

    fn update_script(&mut self) -> Result<Option<ShellExit>> {
        let Some(url) = self.options.self_update_url.clone() else {
            self.say("warn", "self update is not configured (set self_update_url)")?;
            return Ok(None);
        };
        let spinner = Spinner::start(self.options.style, "fetching forkman");
        let outcome = apply_self_update(&self.options.executable, &url, self.scripts);
        spinner.finish();

        match outcome? {
            SelfUpdateOutcome::UpToDate => {
                self.say("info", "forkman is up to date")?;
                Ok(None)
            }
            SelfUpdateOutcome::Replaced { .. } => {
                self.say("ok", "forkman updated; restarting")?;
                Ok(Some(ShellExit::Restart))
            }
        }
    }

    fn prompt_setup_request(&mut self) -> Result<SetupRequest> {
        let Some(name) = self.ask_name("name for the fork: ")? else {
            anyhow::bail!("initial setup aborted: no input");
        };
        let url = if self.controller.registry().exists(&name) {
            String::new()
        } else {
            match ask_required(self.prompter, "repository URL: ")? {
                Some(url) => url,
                None => anyhow::bail!("initial setup aborted: no input"),
            }
        };
        let branch = if url.is_empty() {
            String::new()
        } else {
            self.prompter
                .read_line("branch (empty for the default branch): ")?
                .unwrap_or_default()
        };
        Ok(SetupRequest {
            name,
            url,
            branch: branch.trim().to_string(),
        })
    }

    /// Re-prompts on invalid names; `None` when input runs out.
    fn ask_name(&mut self, question: &str) -> Result<Option<String>> {
        loop {
            let Some(name) = ask_required(self.prompter, question)? else {
                return Ok(None);
            };
            match validate_variant_name(&name) {
                Ok(()) => return Ok(Some(name)),
                Err(err) => self.report(&err.into())?,
            }
        }
    }

    fn report(&mut self, err: &anyhow::Error) -> Result<()> {
        error!("{err:#}");
        let line = render_status_line(self.options.style, "err", &format!("{err:#}"));
        writeln!(self.out, "{line}").context("failed to write to terminal")
    }

    fn say(&mut self, status: &str, message: &str) -> Result<()> {
        let line = render_status_line(self.options.style, status, message);
        writeln!(self.out, "{line}").context("failed to write to terminal")
    }
}

pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ForkError>()
        .is_some_and(ForkError::is_fatal)
}
