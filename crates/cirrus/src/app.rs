//! Application startup for binaries embedding the collector.

use std::sync::Arc;

use snafu::prelude::*;
use tracing::info;

use cirrus_common::{init_metrics, init_tracing};

use crate::catalog::Catalog;
use crate::cloud::CloudProviderRef;
use crate::config::{Config, ConfigPath};
use crate::error::{AppError, ConfigSnafu, MetricsSnafu, RunSnafu, SetupSnafu};
use crate::pipeline::{Orchestrator, RunReport};
use crate::sink::PgDatabase;

/// A loaded, validated configuration and the catalog it was validated against.
pub struct Application {
    config: Config,
    catalog: Catalog,
}

impl Application {
    /// Load and validate configuration from files and directories.
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, AppError> {
        let config = Config::from_paths(paths).context(ConfigSnafu)?;
        Self::new(config)
    }

    pub fn new(config: Config) -> Result<Self, AppError> {
        let catalog = config.catalog().context(ConfigSnafu)?;
        config.validate(&catalog).context(ConfigSnafu)?;
        Ok(Self { config, catalog })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every configured source against Postgres.
    ///
    /// Initializes tracing and, when enabled, the metrics endpoint.
    pub async fn run(self, provider: CloudProviderRef) -> Result<RunReport, AppError> {
        init_tracing();
        if self.config.metrics.enabled {
            init_metrics(&self.config.metrics.address).context(MetricsSnafu)?;
        }

        info!(
            accounts = self.config.accounts.len(),
            sources = ?self.config.sources,
            "Loaded configuration"
        );

        let database = PgDatabase::connect(&self.config.database)
            .await
            .context(SetupSnafu)?;

        Orchestrator::new(provider, Arc::new(database), self.catalog)
            .with_settings(self.config.settings.clone())
            .run(&self.config.accounts, &self.config.sources)
            .await
            .context(RunSnafu)
    }
}
