//! Client configuration and agent application settings.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::ReconnectPolicy;
use crate::error::ClientError;

pub const DEFAULT_AGENT_URL: &str = "http://localhost:3636";

/// Local settings for reaching the agent. Stored as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub agent_url: String,
    pub connect_timeout_ms: u64,
    pub max_attempts: u32,
    pub min_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub reconnect_grow_factor: f64,
    pub max_log_lines: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_url: DEFAULT_AGENT_URL.to_string(),
            connect_timeout_ms: 5_000,
            max_attempts: 60,
            min_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 10_000,
            reconnect_grow_factor: 1.3,
            max_log_lines: crate::logging::DEFAULT_MAX_LOG_LINES,
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ClientError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.agent_url)
            .map_err(|e| anyhow::anyhow!("Invalid agent URL '{}': {}", self.agent_url, e))?;
        if self.connect_timeout_ms == 0 {
            bail!("connect_timeout_ms must be greater than zero");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be greater than zero");
        }
        if self.reconnect_grow_factor < 1.0 {
            bail!(
                "reconnect_grow_factor must be at least 1.0 (got {})",
                self.reconnect_grow_factor
            );
        }
        if self.min_reconnect_delay_ms > self.max_reconnect_delay_ms {
            bail!(
                "min_reconnect_delay_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.min_reconnect_delay_ms,
                self.max_reconnect_delay_ms
            );
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            min_delay: Duration::from_millis(self.min_reconnect_delay_ms),
            max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            grow_factor: self.reconnect_grow_factor,
        }
    }

    /// REST endpoint under the agent root.
    pub fn http_url(&self, path: &str) -> Result<Url, ClientError> {
        let base = Url::parse(&self.agent_url)?;
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    pub fn status_url(&self) -> Result<Url, ClientError> {
        self.ws_url("status")
    }

    pub fn logs_url(&self) -> Result<Url, ClientError> {
        self.ws_url("logs")
    }

    fn ws_url(&self, path: &str) -> Result<Url, ClientError> {
        let mut url = self.http_url(path)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::validation(format!("cannot use {scheme} for {url}")))?;
        Ok(url)
    }
}

/// Agent-side application settings served by `GET|PUT /config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSettings {
    #[serde(default)]
    pub logs: LogsSettings,
    #[serde(default)]
    pub updates: UpdatesSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LogsSettings {
    pub folder: String,
    pub max_files_number: u32,
    pub max_files_size: u32,
    pub max_age_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdatesSettings {
    pub frequency: String,
    pub download_auto: bool,
    pub update_channel: String,
    pub update_url: String,
    pub update_public_key: String,
}
