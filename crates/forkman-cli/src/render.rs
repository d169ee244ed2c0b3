use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use forkman_registry::Variant;
use forkman_switch::UpdateStatus;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty()),
    )
}

pub fn resolve_output_style(stdout_is_tty: bool, no_color: bool) -> OutputStyle {
    if stdout_is_tty && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let (badge, badge_style) = match status {
                "ok" => ("[OK]", ok_style()),
                "warn" => ("[WARN]", warn_style()),
                "err" => ("[ERR]", err_style()),
                _ => ("[..]", Style::new()),
            };
            format!("{} {message}", colorize(badge_style, badge))
        }
    }
}

pub fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

/// One line per variant, active one marked with `*`.
pub fn format_variant_lines(
    variants: &[Variant],
    statuses: &[UpdateStatus],
    active: Option<&str>,
    style: OutputStyle,
) -> Vec<String> {
    if variants.is_empty() {
        return vec!["no forks installed".to_string()];
    }

    let width = variants
        .iter()
        .map(|variant| variant.name.len())
        .max()
        .unwrap_or_default();
    variants
        .iter()
        .enumerate()
        .map(|(index, variant)| {
            let is_active = active == Some(variant.name.as_str());
            let marker = if is_active { "*" } else { " " };
            let branch = match variant.metadata.as_ref().and_then(|meta| meta.branch()) {
                Some(branch) => format!("branch {branch}"),
                None => "default branch".to_string(),
            };
            let status = statuses
                .get(index)
                .copied()
                .unwrap_or(UpdateStatus::Unknown);
            let name = format!("{:<width$}", variant.name);
            match style {
                OutputStyle::Plain => {
                    format!("{marker} {name}  {branch}  [{}]", status.as_str())
                }
                OutputStyle::Rich => {
                    let name = if is_active {
                        colorize(active_style(), &name)
                    } else {
                        name
                    };
                    format!(
                        "{marker} {name}  {branch}  {}",
                        colorize(update_style(status), &format!("[{}]", status.as_str()))
                    )
                }
            }
        })
        .collect()
}

pub fn menu_help_line() -> &'static str {
    "type a fork name to switch, or: clone, delete, update <fork>, update script, exit"
}

/// Spinner on stderr while a blocking call runs. Plain output gets none.
pub struct Spinner {
    progress_bar: Option<ProgressBar>,
}

impl Spinner {
    pub fn start(style: OutputStyle, message: &str) -> Self {
        if style == OutputStyle::Plain {
            return Self { progress_bar: None };
        }
        let progress_bar = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
            progress_bar.set_style(spinner_style.tick_chars("|/-\\ "));
        }
        progress_bar.set_message(message.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            progress_bar: Some(progress_bar),
        }
    }

    pub fn finish(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn active_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn ok_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Green.into()))
}

fn warn_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into()))
}

fn err_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Red.into()))
        .effects(Effects::BOLD)
}

fn update_style(status: UpdateStatus) -> Style {
    match status {
        UpdateStatus::UpdateAvailable => warn_style(),
        UpdateStatus::UpToDate => ok_style(),
        UpdateStatus::Unknown => Style::new().effects(Effects::DIMMED),
    }
}
