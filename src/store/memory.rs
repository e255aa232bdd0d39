//! Process-local store used by tests and single-process embedding.

use super::{ensure_row_id, Filter, MetaStore, OrderBy};
use crate::error::StoreError;
use crate::meta::{Container, MetaTable};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

type Partition = (Container, MetaTable);

/// Rows per (container, table), kept in insertion order.
#[derive(Default)]
pub struct MemoryMetaStore {
    rows: RwLock<HashMap<Partition, Vec<Value>>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        MemoryMetaStore::default()
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let av = a.get(field).filter(|v| !v.is_null());
    let bv = b.get(field).filter(|v| !v.is_null());
    match (av, bv) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => x.to_string().cmp(&y.to_string()),
        },
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(container.clone(), table))
            .and_then(|v| v.iter().find(|r| filter.matches(r)))
            .cloned())
    }

    async fn list(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut out: Vec<Value> = {
            let rows = self.rows.read().await;
            rows.get(&(container.clone(), table))
                .map(|v| v.iter().filter(|r| filter.matches(r)).cloned().collect())
                .unwrap_or_default()
        };
        if let Some(order) = order {
            out.sort_by(|a, b| compare_field(a, b, &order.field));
        }
        Ok(out)
    }

    async fn insert(
        &self,
        container: &Container,
        table: MetaTable,
        mut row: Value,
    ) -> Result<String, StoreError> {
        let id = ensure_row_id(table, &mut row)?;
        self.rows
            .write()
            .await
            .entry((container.clone(), table))
            .or_default()
            .push(row);
        Ok(id)
    }

    async fn update(
        &self,
        container: &Container,
        table: MetaTable,
        patch: Value,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::NotAnObject(table.name().to_string())),
        };
        let mut rows = self.rows.write().await;
        let mut touched = 0u64;
        if let Some(partition) = rows.get_mut(&(container.clone(), table)) {
            for row in partition.iter_mut().filter(|r| filter.matches(r)) {
                if let Value::Object(obj) = row {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn delete(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(partition) = rows.get_mut(&(container.clone(), table)) else {
            return Ok(0);
        };
        let before = partition.len();
        partition.retain(|r| !filter.matches(r));
        Ok((before - partition.len()) as u64)
    }

    async fn count(
        &self,
        container: &Container,
        table: MetaTable,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(container.clone(), table))
            .map(|v| v.iter().filter(|r| filter.matches(r)).count() as u64)
            .unwrap_or(0))
    }
}
