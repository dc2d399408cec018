//! Common configuration types shared across cirrus components.

mod loader;
mod path;
mod vars;

pub use loader::{Mergeable, load_from_paths};
pub use path::{ConfigPath, is_yaml_file};
pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

/// Default number of pipelines allowed to stream at the same time.
pub const DEFAULT_TOTAL_CONCURRENCY: usize = 20;

/// What the scheduler does when one pipeline fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort running and queued pipelines and fail the run.
    #[default]
    Abort,
    /// Keep running the remaining pipelines and report failures at the end.
    Continue,
}

/// Scheduling options that apply to every pipeline in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Maximum number of pipelines in flight at once.
    #[serde(default = "default_total_concurrency")]
    pub total_concurrency: usize,
    /// Behavior when a pipeline fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            total_concurrency: DEFAULT_TOTAL_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl GlobalConfig {
    /// Create a GlobalConfig with a specific concurrency limit.
    pub fn with_concurrency(limit: usize) -> Self {
        Self {
            total_concurrency: limit,
            ..Self::default()
        }
    }

    /// Merge values from another GlobalConfig (last non-default value wins).
    pub fn merge_from(&mut self, other: Self) {
        let defaults = Self::default();
        if other.total_concurrency != defaults.total_concurrency {
            self.total_concurrency = other.total_concurrency;
        }
        if other.failure_policy != defaults.failure_policy {
            self.failure_policy = other.failure_policy;
        }
    }
}

fn default_total_concurrency() -> usize {
    DEFAULT_TOTAL_CONCURRENCY
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to serve the Prometheus endpoint (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

impl MetricsConfig {
    /// Merge values from another MetricsConfig (last-write-wins).
    pub fn merge_from(&mut self, other: Self) {
        if other.enabled {
            self.enabled = true;
        }
        if other.address != default_metrics_address() {
            self.address = other.address;
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_defaults() {
        let config = GlobalConfig::default();
        assert_eq!(config.total_concurrency, 20);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_global_yaml_empty() {
        let config: GlobalConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_global_yaml_values() {
        let yaml = "total_concurrency: 4\nfailure_policy: continue";
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.total_concurrency, 4);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_global_merge_keeps_explicit_values() {
        let mut base = GlobalConfig::with_concurrency(8);
        base.merge_from(GlobalConfig::default());
        assert_eq!(base.total_concurrency, 8);

        base.merge_from(GlobalConfig {
            total_concurrency: 2,
            failure_policy: FailurePolicy::Continue,
        });
        assert_eq!(base.total_concurrency, 2);
        assert_eq!(base.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_metrics_merge() {
        let mut base = MetricsConfig::default();
        base.merge_from(MetricsConfig {
            enabled: true,
            address: "127.0.0.1:9100".to_string(),
        });
        assert!(base.enabled);
        assert_eq!(base.address, "127.0.0.1:9100");
    }

    #[test]
    fn test_metrics_rejects_unknown_fields() {
        let result: Result<MetricsConfig, _> = serde_yaml::from_str("port: 9090");
        assert!(result.is_err());
    }
}
