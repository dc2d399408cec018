//! cirrus-common: Shared components for the cirrus inventory collector.
//!
//! This crate contains the ambient functionality the collection engine is
//! built on:
//!
//! - `config/` - YAML loading, multi-file merging and environment variable interpolation
//! - `metrics/` - Prometheus metrics infrastructure and the `emit!` event macro
//! - `topology` - Bounded scheduler for running many pipelines concurrently
//! - `tracing` - Subscriber initialization
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod topology;
pub mod tracing;

// Re-export commonly used items
pub use config::{
    ConfigPath, DEFAULT_TOTAL_CONCURRENCY, FailurePolicy, GlobalConfig, Mergeable, MetricsConfig,
    interpolate, load_from_paths,
};
pub use error::{ConfigError, MetricsError};
pub use metrics::{MetricsController, init_global as init_metrics, init_test as init_metrics_test};
pub use topology::{Pipeline, PipelineRunner, RunError, RunReport};
pub use tracing::init_tracing;
