//! Physical DDL behind a narrow trait. Names here are physical table/column names.

mod pg;

pub use pg::PgSchemaExecutor;

use crate::error::SchemaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            _ => Err(SchemaError::Rejected(format!("unknown referential action: {}", s))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl PhysicalColumn {
    pub fn nullable(name: &str, data_type: &str) -> Self {
        PhysicalColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            primary_key: false,
        }
    }

    pub fn key(name: &str, data_type: &str) -> Self {
        PhysicalColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: false,
            primary_key: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<PhysicalColumn>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// `None` on drop means "whichever constraint covers `child_table.child_column`".
    pub constraint_name: Option<String>,
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
    pub on_update: ReferentialAction,
    pub on_delete: ReferentialAction,
}

#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    async fn add_column(&self, table: &str, column: &PhysicalColumn) -> Result<(), SchemaError>;
    async fn drop_column(&self, table: &str, column: &str) -> Result<(), SchemaError>;
    async fn add_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError>;
    async fn drop_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError>;
    async fn create_table(&self, table: &TableSpec) -> Result<(), SchemaError>;
    async fn drop_table(&self, table: &str) -> Result<(), SchemaError>;
}
