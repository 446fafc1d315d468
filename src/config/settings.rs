use super::ConfigError;
use crate::shared::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const SLACK_API_BASE_ENV: &str = "ACTIONBRIDGE_SLACK_API_BASE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub slack: SlackSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_socket_reconnect_backoff_ms")]
    pub socket_reconnect_backoff_ms: u64,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            api_base: default_slack_api_base(),
            socket_reconnect_backoff_ms: default_socket_reconnect_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Per-request timeout for runner calls. Unset means requests wait as long
    /// as the runner takes.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,
}

fn default_slack_api_base() -> String {
    DEFAULT_SLACK_API_BASE.to_string()
}

fn default_socket_reconnect_backoff_ms() -> u64 {
    1000
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.slack.api_base.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Settings(
                "`slack.api_base` must be an http(s) URL".to_string(),
            ));
        }
        if self.slack.socket_reconnect_backoff_ms == 0 {
            return Err(ConfigError::Settings(
                "`slack.socket_reconnect_backoff_ms` must be greater than zero".to_string(),
            ));
        }
        if self.runner.request_timeout_secs == Some(0) {
            return Err(ConfigError::Settings(
                "`runner.request_timeout_secs` must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Env override wins over the file so tests and staging can point the
    /// bridge at a mock Slack API without editing config.
    pub fn slack_api_base(&self) -> String {
        std::env::var(SLACK_API_BASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.slack.api_base.clone())
    }

    pub fn runner_request_timeout(&self) -> Option<Duration> {
        self.runner.request_timeout_secs.map(Duration::from_secs)
    }
}
