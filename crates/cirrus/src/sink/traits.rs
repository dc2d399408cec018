//! Traits for database abstractions.
//!
//! The pipeline only talks to these traits, so the engine runs unchanged
//! against Postgres or the in-memory database used in tests.

use std::sync::Arc;

use async_trait::async_trait;

use super::TableSchema;
use crate::error::DatabaseError;
use crate::project::Row;

pub type DatabaseRef = Arc<dyn Database>;

/// Source of transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a new transaction. Every pipeline gets its own.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError>;
}

/// One open transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Send {
    async fn drop_table_if_exists(&mut self, table: &str) -> Result<(), DatabaseError>;

    /// Create the table, its column comments and its indexes.
    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DatabaseError>;

    /// Insert rows whose keys are exactly the schema's column names.
    async fn insert_rows(&mut self, schema: &TableSchema, rows: &[Row]) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
