//! Builds parameterized statements over `_sys_meta_*` payload tables.

use super::{Condition, Filter, OrderBy};
use crate::error::StoreError;
use crate::meta::Container;
use serde_json::Value;

pub(crate) enum Param {
    Text(String),
    Json(Value),
}

pub(crate) struct QueryBuf {
    pub sql: String,
    pub params: Vec<Param>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, p: Param) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(p);
        n
    }
}

/// Field names become JSON path literals; only plain identifiers are accepted.
fn payload_field(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("payload->'{}'", field))
}

/// `WHERE workspace_id = $n AND base_id = $m AND <conditions>`.
fn where_clause(q: &mut QueryBuf, container: &Container, filter: &Filter) -> Result<String, StoreError> {
    let ws = q.push_param(Param::Text(container.workspace_id.clone()));
    let base = q.push_param(Param::Text(container.base_id.clone()));
    let mut parts = vec![format!("workspace_id = ${}", ws), format!("base_id = ${}", base)];
    for cond in filter.conditions() {
        match cond {
            Condition::Eq(field, value) => {
                let path = payload_field(field)?;
                if value.is_null() {
                    parts.push(format!("({path} IS NULL OR {path} = 'null'::jsonb)"));
                } else {
                    let n = q.push_param(Param::Json(value.clone()));
                    parts.push(format!("{} = ${}::jsonb", path, n));
                }
            }
            Condition::AnyOf(field, values) => {
                let path = payload_field(field)?;
                if values.is_empty() {
                    parts.push("FALSE".into());
                    continue;
                }
                let alts: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let n = q.push_param(Param::Json(v.clone()));
                        format!("{} = ${}::jsonb", path, n)
                    })
                    .collect();
                parts.push(format!("({})", alts.join(" OR ")));
            }
        }
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

pub(crate) fn select(
    table: &str,
    container: &Container,
    filter: &Filter,
    order: Option<&OrderBy>,
    limit: Option<u32>,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, container, filter)?;
    let order_sql = match order {
        Some(o) => format!(
            " ORDER BY NULLIF({}, 'null'::jsonb) ASC NULLS LAST, seq ASC",
            payload_field(&o.field)?
        ),
        None => " ORDER BY seq ASC".to_string(),
    };
    let limit_sql = limit.map(|l| format!(" LIMIT {}", l)).unwrap_or_default();
    q.sql = format!("SELECT payload FROM {}{}{}{}", table, where_sql, order_sql, limit_sql);
    Ok(q)
}

pub(crate) fn insert(table: &str, container: &Container, id: &str, row: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(Param::Text(id.to_string()));
    let ws = q.push_param(Param::Text(container.workspace_id.clone()));
    let base = q.push_param(Param::Text(container.base_id.clone()));
    let payload = q.push_param(Param::Json(row));
    q.sql = format!(
        "INSERT INTO {} (id, workspace_id, base_id, payload) VALUES (${}, ${}, ${}, ${})",
        table, id_n, ws, base, payload
    );
    q
}

pub(crate) fn update(
    table: &str,
    container: &Container,
    patch: Value,
    filter: &Filter,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let patch_n = q.push_param(Param::Json(patch));
    let where_sql = where_clause(&mut q, container, filter)?;
    q.sql = format!(
        "UPDATE {} SET payload = payload || ${}::jsonb, updated_at = NOW(){}",
        table, patch_n, where_sql
    );
    Ok(q)
}

pub(crate) fn delete(table: &str, container: &Container, filter: &Filter) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, container, filter)?;
    q.sql = format!("DELETE FROM {}{}", table, where_sql);
    Ok(q)
}

pub(crate) fn count(table: &str, container: &Container, filter: &Filter) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, container, filter)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_sql);
    Ok(q)
}
