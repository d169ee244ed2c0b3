use std::fs;
use std::io;

use anyhow::{Context, Result};
use forkman_core::ForksLayout;
use serde::{Deserialize, Serialize};

/// Where a variant came from. An empty `branch` tracks the remote default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMetadata {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub branch: String,
    /// Repository path relative to the variant root, recorded at clone time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<String>,
}

impl VariantMetadata {
    pub fn new(name: &str, url: &str, branch: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            branch: branch.trim().to_string(),
            repo_dir: None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        if self.branch.is_empty() {
            None
        } else {
            Some(self.branch.as_str())
        }
    }
}

pub fn read_metadata(layout: &ForksLayout, name: &str) -> Result<Option<VariantMetadata>> {
    let path = layout.metadata_path(name);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read variant metadata: {}", path.display()));
        }
    };

    let metadata = serde_json::from_str::<VariantMetadata>(&raw)
        .with_context(|| format!("failed parsing variant metadata: {}", path.display()))?;
    Ok(Some(metadata))
}

pub fn write_metadata(layout: &ForksLayout, metadata: &VariantMetadata) -> Result<()> {
    let path = layout.metadata_path(&metadata.name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut content = serde_json::to_string_pretty(metadata)
        .context("failed serializing variant metadata")?;
    content.push('\n');
    let staged = path.with_extension("json.tmp");
    fs::write(&staged, content)
        .with_context(|| format!("failed to write variant metadata: {}", staged.display()))?;
    fs::rename(&staged, &path)
        .with_context(|| format!("failed to replace variant metadata: {}", path.display()))
}
