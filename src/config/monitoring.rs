use serde::Deserialize;

use crate::constants::DEFAULT_METRICS_PORT;

/// Metrics exposition settings.
#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Whether to serve the Prometheus endpoint
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Listener port for `/metrics`
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            enabled: default_enabled(),
            port: default_port(),
        }
    }
}
