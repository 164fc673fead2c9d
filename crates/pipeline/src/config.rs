//! Client pipeline configuration
//!
//! Loaded from TOML. `API_BASE` in the environment overrides `api_base` from
//! the file so one build can target different backends.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::policy::{DEFAULT_BASE_DELAY, DEFAULT_WAIT_HINT, MAX_ATTEMPTS};

/// Largest accepted `max_retries`; beyond this the doubling delay is absurd.
const MAX_RETRIES_CEILING: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// API origin, e.g. `https://api.example.com`. Trailing `/` is ignored.
    pub api_base: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_base_delay_ms() -> u64 {
    u64::try_from(DEFAULT_BASE_DELAY.as_millis()).unwrap_or(u64::MAX)
}

fn default_max_retries() -> u32 {
    MAX_ATTEMPTS
}

fn default_timeout() -> u64 {
    60
}

fn default_wait_secs() -> u64 {
    DEFAULT_WAIT_HINT.as_secs()
}

fn default_refresh_path() -> String {
    "/api/auth/refresh".into()
}

fn default_login_path() -> String {
    "/auth".into()
}

impl PipelineConfig {
    /// Config with defaults for everything but the origin.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout(),
            default_wait_secs: default_wait_secs(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
        }
    }

    /// Load from a TOML file, overlay `API_BASE`, then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = toml::from_str(&contents)?;
        if let Ok(base) = std::env::var("API_BASE") {
            if !base.trim().is_empty() {
                config.api_base = base;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> common::Result<()> {
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(common::Error::invalid(
                "api_base",
                format!("must start with http:// or https://, got: {}", self.api_base),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(common::Error::invalid("timeout_secs", "must be greater than 0"));
        }
        if self.max_retries > MAX_RETRIES_CEILING {
            return Err(common::Error::invalid(
                "max_retries",
                format!("must be at most {MAX_RETRIES_CEILING}"),
            ));
        }
        if !self.refresh_path.starts_with('/') {
            return Err(common::Error::invalid("refresh_path", "must start with /"));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    /// Join the origin and an API path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
