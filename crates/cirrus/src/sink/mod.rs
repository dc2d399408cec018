//! Relational sink: table (re)creation and batched inserts.

mod loader;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod postgres;
mod schema;
mod traits;
mod value;

pub use loader::BulkLoader;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryDatabase, MemoryTable};
pub use postgres::PgDatabase;
pub use schema::{SchemaManager, TableSchema};
pub use traits::{Database, DatabaseRef, Transaction};
pub use value::SqlValue;
