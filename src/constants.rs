use std::time::Duration;

//---
// Key space
/// Separator between storage key segments
pub(crate) const KEY_SEPARATOR: char = '/';

/// Default prefix applied to every storage key
pub const DEFAULT_KEY_PREFIX: &str = "/registry";

//---
// Maintenance
/// Default interval between backend compaction sweeps. A zero interval in
/// the configuration disables compaction entirely.
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default period between object-count polls feeding the stored-objects metric
pub const DEFAULT_COUNT_POLL_PERIOD: Duration = Duration::from_secs(60);

//---
// Monitoring
/// Default port the Prometheus exporter listens on
pub const DEFAULT_METRICS_PORT: u16 = 9091;
