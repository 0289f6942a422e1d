//! Engine configuration loaded from `foreman.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `FOREMAN_LOG` takes precedence over `log_filter` from the file.

use std::path::Path;

use serde::Deserialize;

use crate::domain::{ForemanError, Result};

pub const LOG_ENV_VAR: &str = "FOREMAN_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Processing jobs claimed longer ago than this are reaped.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Completed and failed jobs are purged after this many hours.
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,

    /// Default page of pending jobs handed to a polling agent.
    #[serde(default = "default_poll_limit")]
    pub poll_limit: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_job_retention_hours() -> u64 {
    72
}

fn default_poll_limit() -> usize {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout_secs(),
            job_retention_hours: default_job_retention_hours(),
            poll_limit: default_poll_limit(),
            sweep_interval_secs: default_sweep_interval_secs(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                ForemanError::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            Self::from_toml_str(&contents)?
        } else {
            Self::default()
        };
        Ok(config.with_log_override(std::env::var(LOG_ENV_VAR).ok()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ForemanError::Config(e.to_string()))
    }

    pub fn with_log_override(mut self, filter: Option<String>) -> Self {
        if let Some(filter) = filter
            && !filter.trim().is_empty()
        {
            self.log_filter = filter;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_timeout_secs == 0 {
            return Err(ForemanError::Config(
                "job_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.job_retention_hours == 0 {
            return Err(ForemanError::Config(
                "job_retention_hours must be greater than 0".into(),
            ));
        }
        self.job_timeout()?;
        self.job_retention()?;
        if self.poll_limit == 0 {
            return Err(ForemanError::Config("poll_limit must be greater than 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ForemanError::Config(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Fails when the value does not fit in a `chrono::Duration`.
    pub fn job_timeout(&self) -> Result<chrono::Duration> {
        i64::try_from(self.job_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| out_of_range("job_timeout_secs", self.job_timeout_secs))
    }

    pub fn job_retention(&self) -> Result<chrono::Duration> {
        i64::try_from(self.job_retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| out_of_range("job_retention_hours", self.job_retention_hours))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn out_of_range(field: &str, value: u64) -> ForemanError {
    ForemanError::Config(format!("{field} = {value} is out of range"))
}
