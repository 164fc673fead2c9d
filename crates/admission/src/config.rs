//! Admission settings, deserialized from the `[admission]` table

use std::time::Duration;

use serde::Deserialize;

use crate::block::DEFAULT_BLOCKLIST;

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Fixed window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests admitted per identity per window.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `User-Agent` substrings rejected with 403.
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,
}

fn default_window_secs() -> u64 {
    60
}

fn default_limit() -> u32 {
    100
}

fn default_blocklist() -> Vec<String> {
    DEFAULT_BLOCKLIST.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            limit: default_limit(),
            blocklist: default_blocklist(),
        }
    }
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
