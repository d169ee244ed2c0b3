use std::time::Duration;

use anyhow::{Context, Result};
use forkman_switch::ScriptSource;
use tracing::debug;

/// Downloads the reference copy of the executable over HTTP(S).
pub struct HttpScriptSource {
    client: reqwest::blocking::Client,
}

impl HttpScriptSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("forkman/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ScriptSource for HttpScriptSource {
    fn fetch_script(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "fetching reference copy");
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("request to {url} returned status {status}");
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading response body from {url}"))?;
        Ok(bytes.to_vec())
    }
}
