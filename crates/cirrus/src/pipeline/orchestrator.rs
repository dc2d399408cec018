//! Scheduling of resource pipelines under one concurrency bound.

use std::sync::Arc;

use tracing::info;

use cirrus_common::topology::RunError as SchedulerError;
use cirrus_common::{PipelineRunner, RunReport as SchedulerReport};

use super::resource::{PipelineContext, ResourcePipeline};
use crate::catalog::Catalog;
use crate::cloud::CloudProviderRef;
use crate::config::{AccountConfig, Settings};
use crate::error::{PipelineError, RunError};
use crate::extract::PaginatedCollector;
use crate::sink::{BulkLoader, DatabaseRef, SchemaManager};

/// Outcome of a run: committed resource types with their row counts, and
/// the failures tolerated under `failure_policy: continue`.
pub type RunReport = SchedulerReport<String, u64, PipelineError>;

/// Runs one pipeline per requested resource type.
pub struct Orchestrator {
    provider: CloudProviderRef,
    database: DatabaseRef,
    catalog: Arc<Catalog>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(provider: CloudProviderRef, database: DatabaseRef, catalog: Catalog) -> Self {
        Self {
            provider,
            database,
            catalog: Arc::new(catalog),
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Collect every resource type in `sources` across `accounts`.
    ///
    /// Under `failure_policy: abort` the first failure cancels queued and
    /// running pipelines; tables already committed stay committed.
    pub async fn run(
        &self,
        accounts: &[AccountConfig],
        sources: &[String],
    ) -> Result<RunReport, RunError> {
        let context = Arc::new(PipelineContext {
            accounts: accounts.to_vec(),
            collector: PaginatedCollector::new(self.provider.clone(), self.settings.retry_policy()),
            database: self.database.clone(),
            schema: SchemaManager,
            loader: BulkLoader::new(self.settings.chunk_size),
            enrichment_concurrency: self.settings.enrichment_concurrency,
        });

        let pipelines: Vec<ResourcePipeline> = sources
            .iter()
            .map(|key| ResourcePipeline::new(key, self.catalog.get(key).cloned(), context.clone()))
            .collect();

        info!(
            accounts = accounts.len(),
            sources = sources.len(),
            total_concurrency = self.settings.global.total_concurrency,
            "Starting collection run"
        );

        let report = PipelineRunner::new(pipelines, &self.settings.global, "pipeline")
            .run()
            .await
            .map_err(|e| match e {
                SchedulerError::Failed {
                    source, aborted, ..
                } => RunError::Aborted { aborted, source },
                SchedulerError::Panicked { message, .. } => RunError::Panicked { message },
            })?;

        let rows: u64 = report.completed.iter().map(|(_, rows)| rows).sum();
        info!(
            committed = report.completed.len(),
            failed = report.failed.len(),
            rows,
            "Collection run finished"
        );
        Ok(report)
    }
}
