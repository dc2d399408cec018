//! Cirrus: collects cloud inventory across accounts and regions into
//! relational tables.
//!
//! This crate handles:
//! - Acquiring per-account sessions and resolving the regions to query
//! - Paginated API retrieval fanned out over every account and region
//! - Per-item enrichment calls with templated parameters
//! - Declarative projection of items onto table columns
//! - Recreating one table per resource type and bulk loading it in a transaction

pub mod app;
pub mod catalog;
pub mod cloud;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod path;
pub mod pipeline;
pub mod project;
pub mod sink;
pub mod template;

// Re-export commonly used items
pub use app::Application;
pub use catalog::Catalog;
pub use cloud::{CloudProvider, CloudProviderRef, RegionResolver, SessionProvider};
pub use config::{AccountConfig, Config};
pub use descriptor::{CallDef, ColumnDef, DescriptorBuilder, ResourceDescriptor, StorageType};
pub use enrich::{EnrichedItem, Enricher};
pub use error::{AppError, PipelineError, RunError};
pub use extract::{PaginatedCollector, RawItem};
pub use path::FieldPath;
pub use pipeline::{Orchestrator, RunReport};
pub use project::{Row, project};
pub use sink::{BulkLoader, Database, PgDatabase, SchemaManager, TableSchema};

#[cfg(any(test, feature = "test-utils"))]
pub use cloud::MemoryCloud;
#[cfg(any(test, feature = "test-utils"))]
pub use sink::MemoryDatabase;

// Re-export from cirrus-common
pub use cirrus_common::{ConfigPath, FailurePolicy, MetricsConfig, init_metrics, init_tracing};
