//! Gateway settings schema.
//!
//! This module defines the process-level configuration of the gateway. It is
//! loaded once at startup from TOML; the per-service adapter rules live in a
//! separate, hot-reloaded document (see [`crate::config::services`]).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener for the check/report RPCs.
    pub listener: ListenerConfig,

    /// Report queue, worker pool and enabled consumers.
    pub reports: ReportsConfig,

    /// Settings for the `statsd` report consumer.
    pub statsd: StatsdConfig,

    /// Where the services configuration comes from.
    pub services: ServicesSourceConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9092").
    pub bind_address: String,

    /// Per-request timeout applied by the HTTP layer.
    pub request_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9092".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Report pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReportsConfig {
    /// Number of workers draining the report queue.
    pub workers: usize,

    /// Bound of the report queue. Producers wait when it is full.
    pub queue_capacity: usize,

    /// Enabled consumer kinds, in delivery order.
    pub consumers: Vec<String>,

    /// Consumers to wrap in the batching decorator, by kind.
    pub batching: BTreeMap<String, BatchSettings>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 1_048_576,
            consumers: vec!["prometheus".into(), "statsd".into(), "log".into()],
            batching: BTreeMap::new(),
        }
    }
}

/// Batching overrides for one consumer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchSettings {
    pub max_batch_count: usize,
    pub batch_timeout_ms: u64,
}

impl BatchSettings {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_batch_count: 50,
            batch_timeout_ms: 60_000,
        }
    }
}

/// Statsd consumer settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatsdConfig {
    /// `host:port` of the statsd daemon.
    pub address: String,

    /// Prepended to every metric name, if non-empty.
    pub prefix: String,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            address: "statsd:8125".to_string(),
            prefix: String::new(),
        }
    }
}

/// Services configuration source and reload cadence.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServicesSourceConfig {
    /// File path, `file://` URL or `http(s)://` URL.
    pub source: String,

    pub poll_interval_secs: u64,

    pub fetch_timeout_secs: u64,

    /// Reload immediately when a file source changes on disk.
    pub watch: bool,
}

impl ServicesSourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ServicesSourceConfig {
    fn default() -> Self {
        Self {
            source: "services.yml".to_string(),
            poll_interval_secs: 5,
            fetch_timeout_secs: 5,
            watch: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Expose the gateway's own metrics on a separate listener.
    pub metrics_enabled: bool,

    /// Self-metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GatewayConfig::default());
        assert_eq!(cfg.reports.queue_capacity, 1_048_576);
        assert_eq!(cfg.services.poll_interval(), Duration::from_secs(5));
        assert!(cfg.observability.metrics_enabled);
        assert_eq!(cfg.observability.metrics_address, "0.0.0.0:9090");
    }

    #[test]
    fn test_batching_table() {
        let cfg: GatewayConfig = toml::from_str(
            r#"
[reports]
workers = 4
consumers = ["statsd"]

[reports.batching.statsd]
max_batch_count = 10
"#,
        )
        .unwrap();

        assert_eq!(cfg.reports.workers, 4);
        let batch = cfg.reports.batching["statsd"];
        assert_eq!(batch.max_batch_count, 10);
        assert_eq!(batch.batch_timeout(), Duration::from_secs(60));
    }
}
