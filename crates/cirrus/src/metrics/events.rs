//! Internal events for cirrus metrics emission.
//!
//! Each event struct represents a measurable occurrence in a resource
//! pipeline. Events implement `InternalEvent`, which records the matching
//! metric through the `metrics` facade.
//!
//! ## Target Labels
//!
//! Every metric carries a `target` label with the resource key
//! (e.g. `"aws_s3_buckets"`) or, below the pipeline, the service name.

use std::time::Duration;

use cirrus_common::metrics::InternalEvent;
use metrics::{counter, histogram};
use tracing::trace;

/// Event emitted when items are read from an API response page.
pub struct ItemsExtracted {
    pub count: u64,
    pub service: String,
    pub operation: String,
}

impl InternalEvent for ItemsExtracted {
    fn emit(self) {
        trace!(count = self.count, service = %self.service, operation = %self.operation, "Items extracted");
        counter!(
            "cirrus_items_extracted_total",
            "service" => self.service,
            "operation" => self.operation
        )
        .increment(self.count);
    }
}

/// Event emitted when an allow-listed remote error becomes a placeholder item.
pub struct ExpectedErrorSuppressed {
    pub service: String,
    pub operation: String,
    pub code: String,
}

impl InternalEvent for ExpectedErrorSuppressed {
    fn emit(self) {
        trace!(service = %self.service, operation = %self.operation, code = %self.code, "Expected error suppressed");
        counter!(
            "cirrus_expected_errors_total",
            "service" => self.service,
            "operation" => self.operation,
            "code" => self.code
        )
        .increment(1);
    }
}

/// Event emitted once per enrichment call issued.
pub struct EnrichmentCall {
    pub target: String,
    pub name: String,
}

impl InternalEvent for EnrichmentCall {
    fn emit(self) {
        counter!(
            "cirrus_enrichment_calls_total",
            "target" => self.target,
            "enrichment" => self.name
        )
        .increment(1);
    }
}

/// Event emitted when a batch of rows is inserted.
pub struct RowsLoaded {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Rows loaded");
        counter!("cirrus_rows_loaded_total", "target" => self.target).increment(self.count);
    }
}

/// Outcome of a resource pipeline.
#[derive(Debug, Clone, Copy)]
pub enum PipelineStatus {
    Committed,
    Failed,
}

impl PipelineStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Committed => "committed",
            PipelineStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a resource pipeline finishes.
pub struct PipelineFinished {
    pub target: String,
    pub status: PipelineStatus,
    pub duration: Duration,
}

impl InternalEvent for PipelineFinished {
    fn emit(self) {
        trace!(target = %self.target, status = self.status.as_str(), duration = ?self.duration, "Pipeline finished");
        counter!(
            "cirrus_pipelines_total",
            "target" => self.target.clone(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!("cirrus_pipeline_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}
