//! Table schema derivation and destructive (re)creation.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use snafu::prelude::*;
use tracing::debug;

use super::Transaction;
use crate::descriptor::{ColumnSpec, StorageType};
use crate::error::{CreateTableSnafu, DropTableSnafu, DuplicateColumnSnafu, SchemaError};
use crate::path::FieldPath;

/// Columns every table gets unless the descriptor excludes them.
static DEFAULT_COLUMNS: LazyLock<Vec<ColumnSpec>> = LazyLock::new(|| {
    [
        ("account_id", "metadata.account_id", "The AWS account ID."),
        ("region", "metadata.region", "The AWS region."),
    ]
    .into_iter()
    .map(|(name, path, description)| ColumnSpec {
        name: name.to_string(),
        description: description.to_string(),
        field_path: FieldPath::compile(path).expect("Invalid default column path"),
        converter: None,
        storage_type: StorageType::Text,
        indexed: true,
    })
    .collect()
});

/// Final shape of a resource table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// The resource key.
    pub name: String,
    /// Sorted by name, names unique.
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Derive the schema: declared columns plus the default ones not
    /// excluded, sorted by name.
    pub fn derive(
        name: &str,
        columns: &[ColumnSpec],
        excluded: &BTreeSet<String>,
    ) -> Result<Self, SchemaError> {
        let mut all: Vec<ColumnSpec> = columns
            .iter()
            .chain(
                DEFAULT_COLUMNS
                    .iter()
                    .filter(|column| !excluded.contains(&column.name)),
            )
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));

        let mut seen = HashSet::with_capacity(all.len());
        for column in &all {
            ensure!(
                seen.insert(column.name.as_str()),
                DuplicateColumnSnafu {
                    table: name,
                    column: &column.name,
                }
            );
        }

        Ok(Self {
            name: name.to_string(),
            columns: all,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Recreates resource tables inside a pipeline's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaManager;

impl SchemaManager {
    /// Derive the table schema, then drop and recreate the table.
    ///
    /// Existing rows are discarded; nothing is diffed or migrated.
    pub async fn prepare(
        &self,
        tx: &mut dyn Transaction,
        key: &str,
        columns: &[ColumnSpec],
        excluded: &BTreeSet<String>,
    ) -> Result<TableSchema, SchemaError> {
        let schema = TableSchema::derive(key, columns, excluded)?;

        tx.drop_table_if_exists(key)
            .await
            .context(DropTableSnafu { table: key })?;
        tx.create_table(&schema)
            .await
            .context(CreateTableSnafu { table: key })?;

        debug!(target = %key, columns = schema.columns.len(), "Table recreated");
        Ok(schema)
    }
}
