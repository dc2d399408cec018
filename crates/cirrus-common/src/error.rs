//! Common error types shared by the cirrus crates.
//!
//! This module defines error types for configuration loading and metrics
//! initialization. Engine errors live in the `cirrus` crate.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No account is configured.
    #[snafu(display("At least one account must be configured"))]
    NoAccounts,

    /// An account has an empty profile.
    #[snafu(display("Account #{index} has an empty profile"))]
    EmptyProfile { index: usize },

    /// No resource type is requested.
    #[snafu(display("At least one source must be configured"))]
    NoSources,

    /// A resource type is requested more than once.
    #[snafu(display("Source '{source_key}' is listed more than once"))]
    DuplicateSource { source_key: String },

    /// A requested resource type has no registered descriptor.
    #[snafu(display("Unknown source '{source_key}'"))]
    UnknownSource { source_key: String },

    /// A numeric setting is out of range.
    #[snafu(display("Setting '{setting}' must be at least 1"))]
    InvalidSetting { setting: String },

    /// A custom descriptor failed validation.
    #[snafu(display("Descriptor '{descriptor}' is invalid: {message}"))]
    InvalidDescriptor { descriptor: String, message: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Duplicate keys found across config files.
    #[snafu(display("Duplicate keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics server not initialized (controller accessed before init).
    #[snafu(display("Metrics server not initialized"))]
    NotInitialized,
}
