//! In-memory transactional database.
//!
//! Tables live behind a shared lock; a transaction works on a private copy
//! and publishes the tables it touched on commit. Values are coerced to
//! their column types on insert, the way a real database would store them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{Database, SqlValue, TableSchema, Transaction};
use crate::error::DatabaseError;
use crate::project::Row;

/// A committed table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl MemoryTable {
    /// Every row's value for one column.
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    failing_tables: HashSet<String>,
    /// Size of every `insert_rows` call, per table, committed or not.
    inserts: BTreeMap<String, Vec<usize>>,
    commits: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert into `table` fail.
    pub fn fail_inserts_into(self, table: impl Into<String>) -> Self {
        self.lock().failing_tables.insert(table.into());
        self
    }

    /// Committed state of a table.
    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.lock().tables.get(name).cloned()
    }

    /// Committed rows of a table; empty when it does not exist.
    pub fn rows(&self, name: &str) -> Vec<Row> {
        self.table(name).map(|table| table.rows).unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Row count of each insert statement issued against `table`, in order.
    pub fn inserts(&self, table: &str) -> Vec<usize> {
        self.lock().inserts.get(table).cloned().unwrap_or_default()
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let tables = self.lock().tables.clone();
        Ok(Box::new(MemoryTransaction {
            database: self.clone(),
            tables,
            touched: BTreeSet::new(),
        }))
    }
}

struct MemoryTransaction {
    database: MemoryDatabase,
    tables: BTreeMap<String, MemoryTable>,
    touched: BTreeSet<String>,
}

impl MemoryTransaction {
    fn coerce_row(&self, schema: &TableSchema, row: &Row) -> Result<Row, DatabaseError> {
        let rejected = |message: String| DatabaseError::RowRejected {
            table: schema.name.clone(),
            message,
        };

        if row.len() != schema.columns.len() {
            return Err(rejected(format!(
                "expected {} columns, got {}",
                schema.columns.len(),
                row.len()
            )));
        }
        schema
            .columns
            .iter()
            .map(|column| {
                let value = row
                    .get(&column.name)
                    .ok_or_else(|| rejected(format!("missing column '{}'", column.name)))?;
                let stored = SqlValue::coerce(column, value).map_err(rejected)?;
                Ok::<_, DatabaseError>((column.name.clone(), stored.to_json()))
            })
            .collect()
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn drop_table_if_exists(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.tables.remove(table);
        self.touched.insert(table.to_string());
        Ok(())
    }

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DatabaseError> {
        if self.tables.contains_key(&schema.name) {
            return Err(DatabaseError::TableExists {
                table: schema.name.clone(),
            });
        }
        self.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        self.touched.insert(schema.name.clone());
        Ok(())
    }

    async fn insert_rows(&mut self, schema: &TableSchema, rows: &[Row]) -> Result<(), DatabaseError> {
        let failing = {
            let mut state = self.database.lock();
            state
                .inserts
                .entry(schema.name.clone())
                .or_default()
                .push(rows.len());
            state.failing_tables.contains(&schema.name)
        };
        if failing {
            return Err(DatabaseError::RowRejected {
                table: schema.name.clone(),
                message: "insert failure injected".to_string(),
            });
        }

        let coerced = rows
            .iter()
            .map(|row| self.coerce_row(schema, row))
            .collect::<Result<Vec<_>, _>>()?;
        let table = self
            .tables
            .get_mut(&schema.name)
            .ok_or_else(|| DatabaseError::NoSuchTable {
                table: schema.name.clone(),
            })?;
        table.rows.extend(coerced);
        self.touched.insert(schema.name.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let Self {
            database,
            mut tables,
            touched,
        } = *self;

        let mut state = database.lock();
        for name in touched {
            match tables.remove(&name) {
                Some(table) => state.tables.insert(name, table),
                None => state.tables.remove(&name),
            };
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::descriptor::{CallDef, ColumnDef, ResourceDescriptor, StorageType};

    fn schema() -> TableSchema {
        let descriptor = ResourceDescriptor::builder("aws_ebs_volumes", "ec2")
            .extract(CallDef::new("describe_volumes", "Volumes"))
            .column(ColumnDef::new("size", "Size").storage(StorageType::Integer))
            .build()
            .unwrap();
        TableSchema::derive(&descriptor.key, &descriptor.columns, &BTreeSet::new()).unwrap()
    }

    fn row(size: Value) -> Row {
        Row::from_iter([
            ("account_id".to_string(), json!("1")),
            ("region".to_string(), json!("us-east-1")),
            ("size".to_string(), size),
        ])
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_invisible() {
        let database = MemoryDatabase::new();
        let mut tx = database.begin().await.unwrap();
        tx.create_table(&schema()).await.unwrap();
        tx.insert_rows(&schema(), &[row(json!(8))]).await.unwrap();
        assert!(database.table("aws_ebs_volumes").is_none());

        tx.commit().await.unwrap();
        assert_eq!(database.rows("aws_ebs_volumes").len(), 1);
        assert_eq!(database.commits(), 1);
    }

    #[tokio::test]
    async fn test_rollback_keeps_previous_table() {
        let database = MemoryDatabase::new();
        let mut tx = database.begin().await.unwrap();
        tx.create_table(&schema()).await.unwrap();
        tx.insert_rows(&schema(), &[row(json!(8))]).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = database.begin().await.unwrap();
        tx.drop_table_if_exists("aws_ebs_volumes").await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(database.rows("aws_ebs_volumes").len(), 1);
    }

    #[tokio::test]
    async fn test_values_are_coerced() {
        let database = MemoryDatabase::new();
        let mut tx = database.begin().await.unwrap();
        tx.create_table(&schema()).await.unwrap();
        tx.insert_rows(&schema(), &[row(json!("16")), row(Value::Null)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let table = database.table("aws_ebs_volumes").unwrap();
        assert_eq!(table.column("size"), vec![json!(16), Value::Null]);
    }

    #[tokio::test]
    async fn test_rejected_rows() {
        let database = MemoryDatabase::new();
        let mut tx = database.begin().await.unwrap();

        let err = tx.insert_rows(&schema(), &[row(json!(1))]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NoSuchTable { .. }));

        tx.create_table(&schema()).await.unwrap();
        let err = tx
            .insert_rows(&schema(), &[row(json!("large"))])
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::RowRejected { .. }));

        let mut short = row(json!(1));
        short.shift_remove("region");
        let err = tx.insert_rows(&schema(), &[short]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::RowRejected { .. }));
    }
}
