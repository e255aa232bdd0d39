//! Durable metadata rows. Rows are JSON objects partitioned by [`Container`].

mod memory;
mod pg;
mod sql;

pub use memory::MemoryMetaStore;
pub use pg::{ensure_database_exists, ensure_meta_tables, meta_table_name, PgMetaStore};
pub(crate) use pg::quote_ident;

use crate::error::StoreError;
use crate::meta::{Container, MetaTable};
use async_trait::async_trait;
use serde_json::Value;

/// One condition on a top-level row field.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    AnyOf(String, Vec<Value>),
}

impl Condition {
    fn field(&self) -> &str {
        match self {
            Condition::Eq(f, _) | Condition::AnyOf(f, _) => f,
        }
    }

    fn matches(&self, row: &Value) -> bool {
        let actual = row.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(_, expected) => actual == expected,
            Condition::AnyOf(_, options) => options.iter().any(|o| o == actual),
        }
    }
}

/// Conjunction of conditions. An empty filter matches every row in the container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn by_id(id: &str) -> Self {
        Filter::new().eq("id", id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn any_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::AnyOf(field.to_string(), values));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Ascending order on one field; rows without a value sort last, ties keep insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        OrderBy {
            field: field.to_string(),
        }
    }
}

#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError>;

    async fn list(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert a row; an `id` is generated when the row has none. Returns the id.
    async fn insert(
        &self,
        container: &Container,
        table: MetaTable,
        row: Value,
    ) -> Result<String, StoreError>;

    /// Shallow-merge `patch` into every matching row. Returns the number of rows touched.
    async fn update(
        &self,
        container: &Container,
        table: MetaTable,
        patch: Value,
        filter: &Filter,
    ) -> Result<u64, StoreError>;

    async fn delete(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<u64, StoreError>;

    async fn count(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<u64, StoreError>;
}

/// Give `row` an id if it lacks one. Returns the id.
pub(crate) fn ensure_row_id(table: MetaTable, row: &mut Value) -> Result<String, StoreError> {
    let obj = row
        .as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(table.name().to_string()))?;
    match obj.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(id) => Ok(id.to_string()),
        None => {
            let id = table.generate_id();
            obj.insert("id".into(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_is_a_conjunction() {
        let row = json!({ "id": "cl_1", "fk_model_id": "md_1", "kind": "relation" });
        assert!(Filter::new().matches(&row));
        assert!(Filter::by_id("cl_1").eq("fk_model_id", "md_1").matches(&row));
        assert!(!Filter::by_id("cl_1").eq("fk_model_id", "md_2").matches(&row));
        assert!(Filter::new().any_of("kind", ["lookup", "relation"]).matches(&row));
        assert!(!Filter::new().any_of("kind", Vec::<String>::new()).matches(&row));
    }

    #[test]
    fn missing_field_compares_as_null() {
        let row = json!({ "id": "cl_1" });
        assert!(Filter::new().eq("order", Value::Null).matches(&row));
    }

    #[test]
    fn ensure_row_id_keeps_existing_and_fills_blank() {
        let mut row = json!({ "id": "md_fixed" });
        assert_eq!(ensure_row_id(MetaTable::Models, &mut row).unwrap(), "md_fixed");
        let mut row = json!({ "title": "x" });
        let id = ensure_row_id(MetaTable::Views, &mut row).unwrap();
        assert!(id.starts_with("vw_"));
        assert_eq!(row["id"], json!(id));
        assert!(ensure_row_id(MetaTable::Views, &mut json!([1])).is_err());
    }
}
