//! Postgres backend built on sqlx.
//!
//! DDL and insert statements are rendered by pure functions so their shape
//! can be checked without a server.

use async_trait::async_trait;
use snafu::prelude::*;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::query_builder::Separated;
use sqlx::types::Json;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, QueryBuilder};
use tracing::debug;

use super::{Database, SqlValue, TableSchema, Transaction};
use crate::config::DatabaseConfig;
use crate::descriptor::{ColumnSpec, StorageType};
use crate::error::{ConnectSnafu, DatabaseError, StatementSnafu, TransactionSnafu};
use crate::project::Row;

/// Upper bound on bind parameters in one statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Longer identifiers are silently truncated by the server.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Connection pool to the target database.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context(ConnectSnafu)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let tx = self
            .pool
            .begin()
            .await
            .context(TransactionSnafu { action: "begin" })?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    async fn execute(&mut self, statement: String) -> Result<(), DatabaseError> {
        sqlx::query(&statement)
            .execute(&mut *self.tx)
            .await
            .context(StatementSnafu {
                statement: &statement,
            })?;
        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn drop_table_if_exists(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.execute(format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .await
    }

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DatabaseError> {
        for statement in create_statements(schema) {
            self.execute(statement).await?;
        }
        Ok(())
    }

    async fn insert_rows(&mut self, schema: &TableSchema, rows: &[Row]) -> Result<(), DatabaseError> {
        let values = rows
            .iter()
            .map(|row| bind_values(schema, row))
            .collect::<Result<Vec<_>, _>>()?;

        for batch in values.chunks(rows_per_statement(schema.columns.len())) {
            let mut builder = insert_prefix(schema);
            builder.push_values(batch, |mut separated, row| {
                for (column, value) in schema.columns.iter().zip(row) {
                    push_value(&mut separated, schema, column, value.clone());
                }
            });

            let statement = builder.sql().to_string();
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .context(StatementSnafu { statement })?;
        }
        debug!(target = %schema.name, rows = rows.len(), "Inserted rows");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .context(TransactionSnafu { action: "commit" })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .rollback()
            .await
            .context(TransactionSnafu { action: "rollback" })
    }
}

/// Quote an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Fit a generated name into the identifier limit.
///
/// Names that are too long are cut and suffixed with a digest of the full
/// name, so two names sharing a long prefix stay distinct.
fn identifier(name: String) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name;
    }
    let digest = Sha256::digest(name.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    let mut end = MAX_IDENTIFIER_LEN - suffix.len() - 1;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{suffix}", &name[..end])
}

fn enum_type_name(table: &str, column: &str) -> String {
    identifier(format!("{table}_{column}_enum"))
}

fn index_name(table: &str, column: &str) -> String {
    identifier(format!("ix_{table}_{column}"))
}

/// SQL type of a column.
pub(crate) fn sql_type(table: &str, column: &ColumnSpec) -> String {
    match &column.storage_type {
        StorageType::Text => "text".to_string(),
        StorageType::Timestamp => "timestamptz".to_string(),
        StorageType::Boolean => "boolean".to_string(),
        StorageType::Integer => "integer".to_string(),
        StorageType::BigInt => "bigint".to_string(),
        StorageType::Float => "double precision".to_string(),
        StorageType::Inet => "inet".to_string(),
        StorageType::TextArray => "text[]".to_string(),
        StorageType::Json => "jsonb".to_string(),
        StorageType::Enum(_) => quote_ident(&enum_type_name(table, &column.name)),
    }
}

/// Everything that creates the table: enum types, the table, column
/// comments and indexes, in execution order.
pub(crate) fn create_statements(schema: &TableSchema) -> Vec<String> {
    let table = &schema.name;
    let mut statements = Vec::new();

    for column in &schema.columns {
        if let StorageType::Enum(variants) = &column.storage_type {
            let name = quote_ident(&enum_type_name(table, &column.name));
            let variants: Vec<String> = variants.iter().map(|v| quote_literal(v)).collect();
            statements.push(format!("DROP TYPE IF EXISTS {name}"));
            statements.push(format!("CREATE TYPE {name} AS ENUM ({})", variants.join(", ")));
        }
    }

    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), sql_type(table, column)))
        .collect();
    statements.push(format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        columns.join(", ")
    ));

    for column in schema.columns.iter().filter(|c| !c.description.is_empty()) {
        statements.push(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            quote_ident(table),
            quote_ident(&column.name),
            quote_literal(&column.description)
        ));
    }

    for column in schema.columns.iter().filter(|c| c.indexed) {
        statements.push(format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&index_name(table, &column.name)),
            quote_ident(table),
            quote_ident(&column.name)
        ));
    }
    statements
}

fn insert_prefix(schema: &TableSchema) -> QueryBuilder<'static, Postgres> {
    let columns: Vec<String> = schema.column_names().map(quote_ident).collect();
    QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        quote_ident(&schema.name),
        columns.join(", ")
    ))
}

/// Rows that fit in one statement without exceeding the bind limit.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

fn bind_values(schema: &TableSchema, row: &Row) -> Result<Vec<SqlValue>, DatabaseError> {
    schema
        .columns
        .iter()
        .map(|column| {
            let value = row.get(&column.name).unwrap_or(&serde_json::Value::Null);
            SqlValue::coerce(column, value).map_err(|message| DatabaseError::RowRejected {
                table: schema.name.clone(),
                message,
            })
        })
        .collect()
}

fn push_value(
    separated: &mut Separated<'_, 'static, Postgres, &'static str>,
    schema: &TableSchema,
    column: &ColumnSpec,
    value: SqlValue,
) {
    match value {
        SqlValue::Text(v) => separated.push_bind(v),
        SqlValue::Timestamp(v) => separated.push_bind(v),
        SqlValue::Boolean(v) => separated.push_bind(v),
        SqlValue::Integer(v) => separated.push_bind(v),
        SqlValue::BigInt(v) => separated.push_bind(v),
        SqlValue::Float(v) => separated.push_bind(v),
        SqlValue::TextArray(v) => separated.push_bind(v),
        SqlValue::Json(v) => separated.push_bind(v.map(Json)),
        SqlValue::Cast(v) => separated
            .push_bind(v)
            .push_unseparated(format!("::{}", sql_type(&schema.name, column))),
    };
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::descriptor::{CallDef, ColumnDef, ResourceDescriptor};

    fn schema() -> TableSchema {
        let descriptor = ResourceDescriptor::builder("aws_ec2_instances", "ec2")
            .extract(CallDef::new("describe_instances", "Reservations[].Instances[]"))
            .column(
                ColumnDef::new("instance_id", "InstanceId")
                    .description("The instance's ID.")
                    .indexed(),
            )
            .column(
                ColumnDef::new("state", "State.Name")
                    .storage(StorageType::Enum(vec!["running".to_string(), "stopped".to_string()])),
            )
            .column(ColumnDef::new("tags", "Tags").storage(StorageType::Json))
            .build()
            .unwrap();
        let excluded = BTreeSet::from(["account_id".to_string(), "region".to_string()]);
        TableSchema::derive(&descriptor.key, &descriptor.columns, &excluded).unwrap()
    }

    #[test]
    fn test_create_statements() {
        let statements = create_statements(&schema());
        assert_eq!(
            statements,
            vec![
                r#"DROP TYPE IF EXISTS "aws_ec2_instances_state_enum""#,
                r#"CREATE TYPE "aws_ec2_instances_state_enum" AS ENUM ('running', 'stopped')"#,
                r#"CREATE TABLE "aws_ec2_instances" ("instance_id" text, "state" "aws_ec2_instances_state_enum", "tags" jsonb)"#,
                r#"COMMENT ON COLUMN "aws_ec2_instances"."instance_id" IS 'The instance''s ID.'"#,
                r#"CREATE INDEX "ix_aws_ec2_instances_instance_id" ON "aws_ec2_instances" ("instance_id")"#,
            ]
        );
    }

    #[test]
    fn test_insert_statement_casts_enums() {
        let schema = schema();
        let row = Row::from_iter([
            ("instance_id".to_string(), serde_json::json!("i-1")),
            ("state".to_string(), serde_json::json!("running")),
            ("tags".to_string(), serde_json::Value::Null),
        ]);
        let values = vec![bind_values(&schema, &row).unwrap()];

        let mut builder = insert_prefix(&schema);
        builder.push_values(&values, |mut separated, row| {
            for (column, value) in schema.columns.iter().zip(row) {
                push_value(&mut separated, &schema, column, value.clone());
            }
        });

        assert_eq!(
            builder.sql(),
            r#"INSERT INTO "aws_ec2_instances" ("instance_id", "state", "tags") VALUES ($1, $2::"aws_ec2_instances_state_enum", $3)"#
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(sql_type("t", &schema().columns[2]), "jsonb");
    }

    #[test]
    fn test_long_generated_names_fit_identifier_limit() {
        let table = "aws_elasticloadbalancingv2_target_group_attributes";
        let first = index_name(table, "health_check_interval_seconds");
        let second = index_name(table, "health_check_timeout_seconds");

        assert_eq!(first.len(), MAX_IDENTIFIER_LEN);
        assert_eq!(second.len(), MAX_IDENTIFIER_LEN);
        assert_ne!(first, second);
        assert!(first.starts_with("ix_aws_elasticloadbalancingv2_target_group_attributes_"));
        assert_eq!(first, index_name(table, "health_check_interval_seconds"));

        let enum_name = enum_type_name(table, "load_balancing_algorithm_type");
        assert!(enum_name.len() <= MAX_IDENTIFIER_LEN);
        assert_ne!(enum_name, enum_type_name(table, "load_balancing_cross_zone_enabled"));
    }

    #[test]
    fn test_long_names_are_cut_on_char_boundary() {
        let name = identifier(format!("ix_{}", "é".repeat(40)));
        assert!(name.len() <= MAX_IDENTIFIER_LEN);
        assert!(name.starts_with("ix_é"));
        assert_eq!(identifier("ix_short".to_string()), "ix_short");
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(3), 21_845);
        assert_eq!(rows_per_statement(0), 65_535);
    }
}
