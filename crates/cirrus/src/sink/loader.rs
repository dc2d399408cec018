//! Batched row insertion.

use futures::{Stream, TryStreamExt};
use snafu::prelude::*;

use super::{TableSchema, Transaction};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{InsertSnafu, LoadError, LoadSnafu, PipelineError};
use crate::metrics::events::RowsLoaded;
use crate::project::Row;
use cirrus_common::emit;

/// Writes rows in fixed-size batches inside the caller's transaction.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoader {
    chunk_size: usize,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BulkLoader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Drain `rows` into the table, one insert per full batch plus one for
    /// the remainder. Returns the number of rows written.
    ///
    /// The first error from the stream or from an insert stops the load.
    pub async fn load<S>(
        &self,
        tx: &mut dyn Transaction,
        schema: &TableSchema,
        rows: S,
    ) -> Result<u64, PipelineError>
    where
        S: Stream<Item = Result<Row, PipelineError>> + Send,
    {
        let mut rows = std::pin::pin!(rows);
        let mut batch = Vec::with_capacity(self.chunk_size);
        let mut loaded = 0;

        while let Some(row) = rows.try_next().await? {
            batch.push(row);
            if batch.len() >= self.chunk_size {
                loaded += self.flush(tx, schema, &mut batch).await?;
            }
        }
        loaded += self.flush(tx, schema, &mut batch).await?;
        Ok(loaded)
    }

    /// Insert and clear a batch; an empty batch is a no-op.
    async fn flush(
        &self,
        tx: &mut dyn Transaction,
        schema: &TableSchema,
        batch: &mut Vec<Row>,
    ) -> Result<u64, PipelineError> {
        self.insert(tx, schema, batch.as_slice())
            .await
            .context(LoadSnafu {
                resource: &schema.name,
            })?;
        let count = batch.len() as u64;
        batch.clear();
        Ok(count)
    }

    /// Insert one batch of rows.
    pub async fn insert(
        &self,
        tx: &mut dyn Transaction,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<(), LoadError> {
        if rows.is_empty() {
            return Ok(());
        }
        tx.insert_rows(schema, rows).await.context(InsertSnafu {
            table: &schema.name,
            rows: rows.len(),
        })?;
        emit!(RowsLoaded {
            count: rows.len() as u64,
            target: schema.name.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use futures::stream;
    use serde_json::json;

    use super::*;
    use crate::descriptor::{CallDef, ColumnDef, ResourceDescriptor};
    use crate::sink::{Database, MemoryDatabase};

    fn schema() -> TableSchema {
        let descriptor = ResourceDescriptor::builder("aws_lambda_functions", "lambda")
            .extract(CallDef::new("list_functions", "Functions"))
            .column(ColumnDef::new("name", "FunctionName"))
            .build()
            .unwrap();
        let excluded = BTreeSet::from(["account_id".to_string(), "region".to_string()]);
        TableSchema::derive(&descriptor.key, &descriptor.columns, &excluded).unwrap()
    }

    fn rows(count: usize) -> Vec<Result<Row, PipelineError>> {
        (0..count)
            .map(|i| Ok(Row::from_iter([("name".to_string(), json!(format!("fn-{i}")))])))
            .collect()
    }

    async fn load(database: &MemoryDatabase, loader: BulkLoader, count: usize) -> Result<u64, PipelineError> {
        let mut tx = database.begin().await.unwrap();
        tx.create_table(&schema()).await.unwrap();
        let loaded = loader
            .load(tx.as_mut(), &schema(), stream::iter(rows(count)))
            .await?;
        tx.commit().await.unwrap();
        Ok(loaded)
    }

    #[tokio::test]
    async fn test_rows_are_written_in_batches() {
        let database = MemoryDatabase::new();
        let loaded = load(&database, BulkLoader::new(2), 5).await.unwrap();

        assert_eq!(loaded, 5);
        let names = database.table("aws_lambda_functions").unwrap().column("name");
        assert_eq!(names.len(), 5);
        assert_eq!(names[4], json!("fn-4"));
        assert_eq!(database.inserts("aws_lambda_functions"), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_insert() {
        let database = MemoryDatabase::new();
        load(&database, BulkLoader::new(3), 6).await.unwrap();
        assert_eq!(database.inserts("aws_lambda_functions"), vec![3, 3]);
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let database = MemoryDatabase::new().fail_inserts_into("aws_lambda_functions");
        let loaded = load(&database, BulkLoader::default(), 0).await.unwrap();
        assert_eq!(loaded, 0);
        assert!(database.inserts("aws_lambda_functions").is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_is_load_error() {
        let database = MemoryDatabase::new().fail_inserts_into("aws_lambda_functions");
        let err = load(&database, BulkLoader::default(), 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
        assert_eq!(err.resource(), "aws_lambda_functions");
    }

    #[test]
    fn test_chunk_size_is_at_least_one() {
        assert_eq!(BulkLoader::new(0).chunk_size(), 1);
        assert_eq!(BulkLoader::default().chunk_size(), 1000);
    }
}
