//! DDL against PostgreSQL user tables in one data schema.

use super::{ForeignKeySpec, PhysicalColumn, SchemaExecutor, TableSpec};
use crate::error::SchemaError;
use crate::store::quote_ident;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PgSchemaExecutor {
    pool: PgPool,
    schema: String,
}

impl PgSchemaExecutor {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgSchemaExecutor {
            pool,
            schema: schema.into(),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    async fn run(&self, sql: &str) -> Result<(), SchemaError> {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn constraint_for(&self, table: &str, column: &str) -> Result<String, SchemaError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT con.conname::text
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
            JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = ANY(con.conkey)
            WHERE con.contype = 'f' AND nsp.nspname = $1 AND rel.relname = $2 AND att.attname = $3
            LIMIT 1
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.0).ok_or_else(|| SchemaError::ForeignKeyNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

fn column_def(c: &PhysicalColumn) -> String {
    let mut def = format!("{} {}", quote_ident(&c.name), c.data_type);
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

#[async_trait]
impl SchemaExecutor for PgSchemaExecutor {
    async fn add_column(&self, table: &str, column: &PhysicalColumn) -> Result<(), SchemaError> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.qualified(table),
            column_def(column)
        );
        self.run(&sql).await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<(), SchemaError> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            self.qualified(table),
            quote_ident(column)
        );
        self.run(&sql).await
    }

    async fn add_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError> {
        let name = fk
            .constraint_name
            .as_deref()
            .ok_or_else(|| SchemaError::Rejected("foreign key needs a constraint name".into()))?;
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
            self.qualified(&fk.child_table),
            quote_ident(name),
            quote_ident(&fk.child_column),
            self.qualified(&fk.parent_table),
            quote_ident(&fk.parent_column),
            fk.on_update.as_sql(),
            fk.on_delete.as_sql()
        );
        self.run(&sql).await
    }

    async fn drop_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError> {
        let name = match &fk.constraint_name {
            Some(n) => n.clone(),
            None => self.constraint_for(&fk.child_table, &fk.child_column).await?,
        };
        let sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            self.qualified(&fk.child_table),
            quote_ident(&name)
        );
        self.run(&sql).await
    }

    async fn create_table(&self, table: &TableSpec) -> Result<(), SchemaError> {
        if table.columns.is_empty() {
            return Err(SchemaError::Rejected(format!("table {} has no columns", table.name)));
        }
        let mut defs: Vec<String> = table.columns.iter().map(column_def).collect();
        let pk: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_ident(&c.name))
            .collect();
        if !pk.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }
        let sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualified(&table.name),
            defs.join(",\n  ")
        );
        self.run(&sql).await
    }

    async fn drop_table(&self, table: &str) -> Result<(), SchemaError> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.qualified(table));
        self.run(&sql).await
    }
}
