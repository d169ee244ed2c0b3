use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "FORKMAN_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkmanConfig {
    pub forks_root: PathBuf,
    pub active_link: PathBuf,
    pub current_pointer_file: PathBuf,
    pub runtime_state_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_max_bytes: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub network_timeout_secs: u64,
    pub update_check_workers: usize,
    pub self_update_url: Option<String>,
    pub require_root: bool,
}

impl Default for ForkmanConfig {
    fn default() -> Self {
        Self {
            forks_root: PathBuf::from("/data/forks"),
            active_link: PathBuf::from("/data/openpilot"),
            current_pointer_file: PathBuf::from("/data/forks/current_fork"),
            runtime_state_dir: PathBuf::from("/data/params"),
            log_file: PathBuf::from("/data/forks/forkman.log"),
            log_max_bytes: 1_048_576,
            retry_attempts: 3,
            retry_delay_secs: 5,
            network_timeout_secs: 30,
            update_check_workers: 4,
            self_update_url: None,
            require_root: true,
        }
    }
}

impl ForkmanConfig {
    /// Loads `path` if given, otherwise the env override, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };
        let Some(resolved) = resolved else {
            return Ok(Self::default());
        };
        Self::from_file(&resolved)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed parsing config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            anyhow::bail!("retry_attempts must be at least 1");
        }
        if self.update_check_workers == 0 {
            anyhow::bail!("update_check_workers must be at least 1");
        }
        if self.log_max_bytes == 0 {
            anyhow::bail!("log_max_bytes must be greater than zero");
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
