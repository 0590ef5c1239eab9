//! Configuration management for the storage layer.
//!
//! Settings merge from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML config file
//! 3. Environment variables (highest priority)

mod backend;
mod monitoring;
pub use backend::*;
pub use monitoring::*;


use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Backend connection and key-space settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Metrics exposition settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration with priority:
    /// 1. `config_path` (or `config/store` when not given, both optional)
    /// 2. `ARGUS__`-separated environment variables (highest priority)
    ///
    /// # Returns
    /// Merged configuration with the backend section validated
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                builder = builder.add_source(File::with_name(path).required(true));
            }
            None => {
                builder = builder.add_source(File::with_name("config/store").required(false));
            }
        }

        // Environment variables (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("ARGUS")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.backend.validate()?;
        Ok(settings)
    }
}
