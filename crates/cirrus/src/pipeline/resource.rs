//! One resource type's extract, enrich, transform and load run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use cirrus_common::Pipeline;
use cirrus_common::emit;

use crate::config::AccountConfig;
use crate::descriptor::ResourceDescriptor;
use crate::enrich::Enricher;
use crate::error::{DatabaseSnafu, PipelineError, SchemaSnafu, UnknownResourceSnafu};
use crate::extract::PaginatedCollector;
use crate::metrics::events::{PipelineFinished, PipelineStatus};
use crate::project::project;
use crate::sink::{BulkLoader, DatabaseRef, SchemaManager, Transaction};

/// Lifecycle of a resource pipeline.
///
/// `Pending -> SchemaReady -> Streaming -> Committed`, or `Failed` from any
/// state before `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    SchemaReady,
    Streaming,
    Committed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::SchemaReady => "schema_ready",
            Self::Streaming => "streaming",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything the pipelines of one run share.
pub struct PipelineContext {
    pub accounts: Vec<AccountConfig>,
    pub collector: PaginatedCollector,
    pub database: DatabaseRef,
    pub schema: SchemaManager,
    pub loader: BulkLoader,
    /// Items enriched at once; unbounded when absent.
    pub enrichment_concurrency: Option<usize>,
}

/// Pipeline for a single resource type.
pub struct ResourcePipeline {
    key: String,
    descriptor: Option<ResourceDescriptor>,
    context: Arc<PipelineContext>,
    state: PipelineState,
}

impl ResourcePipeline {
    /// A pipeline for `key`; a missing descriptor fails the pipeline when run.
    pub fn new(
        key: impl Into<String>,
        descriptor: Option<ResourceDescriptor>,
        context: Arc<PipelineContext>,
    ) -> Self {
        Self {
            key: key.into(),
            descriptor,
            context,
            state: PipelineState::Pending,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(target = %self.key, from = %self.state, to = %next, "Pipeline state changed");
        self.state = next;
    }

    async fn execute(&mut self) -> Result<u64, PipelineError> {
        let descriptor = self
            .descriptor
            .take()
            .context(UnknownResourceSnafu { resource: &self.key })?;

        let mut tx = self
            .context
            .database
            .begin()
            .await
            .context(DatabaseSnafu { resource: &self.key })?;

        match self.stream_into(tx.as_mut(), &descriptor).await {
            Ok(rows) => {
                tx.commit()
                    .await
                    .context(DatabaseSnafu { resource: &self.key })?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(target = %self.key, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn stream_into(
        &mut self,
        tx: &mut dyn Transaction,
        descriptor: &ResourceDescriptor,
    ) -> Result<u64, PipelineError> {
        let context = self.context.clone();

        let schema = context
            .schema
            .prepare(
                tx,
                &descriptor.key,
                &descriptor.columns,
                &descriptor.excluded_default_columns,
            )
            .await
            .context(SchemaSnafu { resource: &self.key })?;
        self.advance(PipelineState::SchemaReady);

        let items = context
            .collector
            .from_descriptor(&context.accounts, descriptor);
        let enriched = Enricher::new(context.collector.clone(), descriptor)
            .enrich_stream(items, context.enrichment_concurrency);
        let columns = schema.columns.clone();
        let rows = enriched.map_ok(move |item| project(&item, &columns));

        self.advance(PipelineState::Streaming);
        context.loader.load(tx, &schema, rows).await
    }
}

impl Pipeline for ResourcePipeline {
    type Key = String;
    type Output = u64;
    type Error = PipelineError;

    fn key(&self) -> &String {
        &self.key
    }

    async fn run(mut self) -> Result<u64, PipelineError> {
        let started = Instant::now();
        info!(target = %self.key, "Pipeline started");

        let result = self.execute().await;
        let status = match &result {
            Ok(rows) => {
                self.advance(PipelineState::Committed);
                info!(target = %self.key, rows, elapsed = ?started.elapsed(), "Pipeline committed");
                PipelineStatus::Committed
            }
            Err(e) => {
                self.advance(PipelineState::Failed);
                warn!(target = %self.key, state = %self.state, error = %e, "Pipeline failed");
                PipelineStatus::Failed
            }
        };

        emit!(PipelineFinished {
            target: self.key.clone(),
            status,
            duration: started.elapsed(),
        });
        result
    }
}
