//! Configuration for the cirrus collector.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use cirrus_common::config::{
    ConfigPath, FailurePolicy, GlobalConfig, Mergeable, MetricsConfig, interpolate,
    load_from_paths,
};
use cirrus_common::error::ConfigError;

use crate::catalog::Catalog;
use crate::cloud::RetryPolicy;
use crate::descriptor::DescriptorBuilder;

/// Default number of rows per insert statement.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// One cloud account to collect from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Named credential profile the base session is built from.
    pub profile: String,
    /// Role to assume on top of the base session.
    #[serde(default)]
    pub assume_role: Option<String>,
}

impl AccountConfig {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            assume_role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.assume_role = Some(role.into());
        self
    }
}

/// Connection settings for the target database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    #[serde(default)]
    pub url: String,
    /// Size of the connection pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Merge values from another DatabaseConfig (last non-default value wins).
    pub fn merge_from(&mut self, other: Self) {
        if !other.url.is_empty() {
            self.url = other.url;
        }
        if other.max_connections != default_max_connections() {
            self.max_connections = other.max_connections;
        }
    }
}

fn default_max_connections() -> u32 {
    20
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Pipeline scheduling: `total_concurrency` and `failure_policy`.
    #[serde(flatten)]
    pub global: GlobalConfig,
    /// Rows per insert batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Items enriched at once within one pipeline; unbounded when absent.
    #[serde(default)]
    pub enrichment_concurrency: Option<usize>,
    /// Attempt cap for the clients' adaptive retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            enrichment_concurrency: None,
            max_attempts: default_max_attempts(),
        }
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::adaptive(self.max_attempts)
    }

    /// Merge values from other Settings (last non-default value wins).
    pub fn merge_from(&mut self, other: Self) {
        self.global.merge_from(other.global);
        if other.chunk_size != DEFAULT_CHUNK_SIZE {
            self.chunk_size = other.chunk_size;
        }
        if other.enrichment_concurrency.is_some() {
            self.enrichment_concurrency = other.enrichment_concurrency;
        }
        if other.max_attempts != default_max_attempts() {
            self.max_attempts = other.max_attempts;
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    RetryPolicy::DEFAULT_MAX_ATTEMPTS
}

/// Main configuration for cirrus.
///
/// # Example
///
/// ```yaml
/// accounts:
///   - profile: prod
///     assume_role: arn:aws:iam::123456789012:role/inventory
/// sources: [aws_s3_buckets, aws_ec2_instances]
/// database:
///   url: postgres://localhost/inventory
/// settings:
///   total_concurrency: 8
///   failure_policy: continue
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Resource keys to collect, one table each.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Resource types declared in configuration, keyed by resource key.
    #[serde(default)]
    pub descriptors: IndexMap<String, DescriptorBuilder>,
}

impl Mergeable for Config {
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }

    fn merge(&mut self, other: Self) -> Result<(), ConfigError> {
        let mut duplicates: Vec<String> = other
            .sources
            .iter()
            .filter(|source| self.sources.contains(source))
            .cloned()
            .collect();
        duplicates.extend(
            other
                .descriptors
                .keys()
                .filter(|key| self.descriptors.contains_key(*key))
                .cloned(),
        );
        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateComponents { keys: duplicates });
        }

        self.accounts.extend(other.accounts);
        self.sources.extend(other.sources);
        self.descriptors.extend(other.descriptors);
        self.database.merge_from(other.database);
        self.settings.merge_from(other.settings);
        self.metrics.merge_from(other.metrics);
        Ok(())
    }
}

impl Config {
    /// Load configuration from multiple paths (files or directories).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config: Self = load_from_paths(paths)?;
        config.validate(&config.catalog()?)?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config = Self::parse_yaml(&result.text)?;
        config.validate(&config.catalog()?)?;
        Ok(config)
    }

    /// The built-in catalog extended with the descriptors declared here.
    ///
    /// A declared descriptor replaces a built-in one with the same key.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let mut catalog = Catalog::builtin().map_err(|e| ConfigError::InvalidDescriptor {
            descriptor: "builtin".to_string(),
            message: e.to_string(),
        })?;

        for (key, builder) in &self.descriptors {
            let mut builder = builder.clone();
            builder.key = key.clone();
            let descriptor = builder
                .build()
                .map_err(|e| ConfigError::InvalidDescriptor {
                    descriptor: key.clone(),
                    message: e.to_string(),
                })?;
            catalog.register(descriptor);
        }
        Ok(catalog)
    }

    /// Validate the configuration against the catalog it will run with.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        if let Some(index) = self
            .accounts
            .iter()
            .position(|account| account.profile.trim().is_empty())
        {
            return Err(ConfigError::EmptyProfile { index });
        }

        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.as_str()) {
                return Err(ConfigError::DuplicateSource {
                    source_key: source.clone(),
                });
            }
            if !catalog.contains(source) {
                return Err(ConfigError::UnknownSource {
                    source_key: source.clone(),
                });
            }
        }

        let settings = &self.settings;
        let invalid = [
            ("total_concurrency", settings.global.total_concurrency == 0),
            ("chunk_size", settings.chunk_size == 0),
            ("max_attempts", settings.max_attempts == 0),
            (
                "enrichment_concurrency",
                settings.enrichment_concurrency == Some(0),
            ),
        ];
        if let Some((setting, _)) = invalid.into_iter().find(|(_, invalid)| *invalid) {
            return Err(ConfigError::InvalidSetting {
                setting: setting.to_string(),
            });
        }

        Ok(())
    }
}
