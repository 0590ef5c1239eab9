use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::DEFAULT_COMPACTION_INTERVAL;
use crate::constants::DEFAULT_COUNT_POLL_PERIOD;
use crate::constants::DEFAULT_KEY_PREFIX;
use crate::Result;

/// Connection and key-space settings for the storage backend.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Prefix applied to every storage key
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Backend servers to connect with. Empty selects the embedded backend.
    #[serde(default)]
    pub server_list: Vec<String>,

    /// TLS credentials, handed to the connection layer untouched
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Whether list paging is honored. Gated per deployment, not per caller.
    #[serde(default)]
    pub paging: bool,

    /// Seconds between compaction sweeps; zero disables compaction
    #[serde(default = "default_compaction_interval_secs")]
    pub compaction_interval_secs: u64,

    /// Seconds between object-count polls feeding the stored-objects metric
    #[serde(default = "default_count_poll_period_secs")]
    pub count_poll_period_secs: u64,
}

fn default_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_compaction_interval_secs() -> u64 {
    DEFAULT_COMPACTION_INTERVAL.as_secs()
}

fn default_count_poll_period_secs() -> u64 {
    DEFAULT_COUNT_POLL_PERIOD.as_secs()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            prefix: default_prefix(),
            server_list: Vec::new(),
            key_file: None,
            cert_file: None,
            ca_file: None,
            paging: false,
            compaction_interval_secs: default_compaction_interval_secs(),
            count_poll_period_secs: default_count_poll_period_secs(),
        }
    }
}

impl BackendConfig {
    /// Interval between compaction sweeps; `None` when disabled
    pub fn compaction_interval(&self) -> Option<Duration> {
        (self.compaction_interval_secs != 0)
            .then(|| Duration::from_secs(self.compaction_interval_secs))
    }

    pub fn count_poll_period(&self) -> Duration {
        Duration::from_secs(self.count_poll_period_secs.max(1))
    }

    /// # Errors
    /// Fails when the key prefix is empty, lacks a leading separator or
    /// carries a trailing one.
    pub fn validate(&self) -> Result<()> {
        if !self.prefix.starts_with('/') {
            return Err(config::ConfigError::Message(format!(
                "invalid key prefix {:?}: must start with '/'",
                self.prefix
            ))
            .into());
        }
        if self.prefix.len() > 1 && self.prefix.ends_with('/') {
            return Err(config::ConfigError::Message(format!(
                "invalid key prefix {:?}: must not end with '/'",
                self.prefix
            ))
            .into());
        }
        Ok(())
    }
}
