use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use forkman_core::{is_interrupted, ForkError};

/// Source of operator input.
pub trait Prompter {
    /// Returns `None` once input is exhausted.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for StdinPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}").context("failed to write prompt")?;
        stdout.flush().context("failed to flush prompt")?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line);
        if is_interrupted() {
            return Err(ForkError::Interrupted.into());
        }
        match read {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(err) => Err(err).context("failed to read operator input"),
        }
    }
}

/// Anything starting with `y` or `Y` counts as yes.
pub fn confirm(prompter: &mut dyn Prompter, question: &str) -> Result<bool> {
    let answer = prompter.read_line(question)?.unwrap_or_default();
    Ok(answer.trim_start().starts_with(['y', 'Y']))
}

/// Re-prompts until a non-empty answer; `None` when input runs out.
pub fn ask_required(prompter: &mut dyn Prompter, question: &str) -> Result<Option<String>> {
    loop {
        let Some(answer) = prompter.read_line(question)? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(Some(answer.to_string()));
        }
    }
}
