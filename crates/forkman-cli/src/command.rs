use anyhow::Result;
use forkman_core::validate_variant_name;

/// One operator request, parsed once from a menu line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    Switch(String),
    Clone,
    Delete,
    Exit,
    UpdateScript,
    UpdateVariant(String),
}

impl MenuCommand {
    /// Keywords match case-insensitively; variant names keep their case.
    /// Blank input yields `None`.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let mut words = input.split_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match (first.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("clone", []) => Self::Clone,
            ("delete", []) => Self::Delete,
            ("exit", []) => Self::Exit,
            ("update", [target]) if target.eq_ignore_ascii_case("script") => Self::UpdateScript,
            ("update", [name]) => {
                validate_variant_name(name)?;
                Self::UpdateVariant((*name).to_string())
            }
            ("update", _) => anyhow::bail!("usage: update <fork> | update script"),
            (_, []) => {
                validate_variant_name(first)?;
                Self::Switch(first.to_string())
            }
            _ => anyhow::bail!("unrecognized command: {}", input.trim()),
        };
        Ok(Some(command))
    }
}
