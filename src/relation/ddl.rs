//! Physical steps of a relation lifecycle. Failures are logged and reported as `false`; callers carry on.

use crate::schema::{ForeignKeySpec, PhysicalColumn, SchemaExecutor, TableSpec};

pub struct PhysicalSteps<'a> {
    executor: &'a dyn SchemaExecutor,
}

impl<'a> PhysicalSteps<'a> {
    pub fn new(executor: &'a dyn SchemaExecutor) -> Self {
        PhysicalSteps { executor }
    }

    pub async fn add_column(&self, table: &str, column: &PhysicalColumn) -> bool {
        match self.executor.add_column(table, column).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(table = %table, column = %column.name, error = %e, "add column failed; continuing");
                false
            }
        }
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> bool {
        match self.executor.drop_column(table, column).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(table = %table, column = %column, error = %e, "drop column failed; continuing");
                false
            }
        }
    }

    pub async fn add_foreign_key(&self, fk: &ForeignKeySpec) -> bool {
        match self.executor.add_foreign_key(fk).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    table = %fk.child_table,
                    column = %fk.child_column,
                    references = %fk.parent_table,
                    error = %e,
                    "add foreign key failed; continuing"
                );
                false
            }
        }
    }

    pub async fn drop_foreign_key(&self, fk: &ForeignKeySpec) -> bool {
        match self.executor.drop_foreign_key(fk).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    table = %fk.child_table,
                    column = %fk.child_column,
                    error = %e,
                    "drop foreign key failed; continuing"
                );
                false
            }
        }
    }

    pub async fn create_table(&self, table: &TableSpec) -> bool {
        match self.executor.create_table(table).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(table = %table.name, error = %e, "create table failed; continuing");
                false
            }
        }
    }

    pub async fn drop_table(&self, table: &str) -> bool {
        match self.executor.drop_table(table).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "drop table failed; continuing");
                false
            }
        }
    }
}
