//! Fire-and-forget audit events for relation and column changes.

use crate::meta::{Container, MetaTable};
use crate::store::meta_table_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOp {
    RelationCreate,
    RelationDelete,
    ColumnCreate,
    ColumnUpdate,
    ColumnDelete,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub op: AuditOp,
    pub actor: Option<String>,
    pub description: String,
    pub workspace_id: String,
    pub base_id: String,
    pub fk_model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(op: AuditOp, container: &Container, actor: Option<&str>, description: String) -> Self {
        AuditEvent {
            op,
            actor: actor.map(String::from),
            description,
            workspace_id: container.workspace_id.clone(),
            base_id: container.base_id.clone(),
            fk_model_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_model(mut self, model_id: &str) -> Self {
        self.fk_model_id = Some(model_id.to_string());
        self
    }
}

/// Receives events off the mutation path. Implementations must not block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits each event as a structured log line.
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            op = ?event.op,
            actor = event.actor.as_deref().unwrap_or("-"),
            model = event.fk_model_id.as_deref().unwrap_or("-"),
            base = %event.base_id,
            "{}",
            event.description
        );
    }
}

/// Inserts into `<schema>._sys_meta_audit` on a spawned task.
pub struct PgAuditSink {
    pool: PgPool,
    table: String,
}

impl PgAuditSink {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgAuditSink {
            pool,
            table: meta_table_name(schema, MetaTable::Audit),
        }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) {
        let payload = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "audit event does not serialize");
                return;
            }
        };
        let sql = format!(
            "INSERT INTO {} (id, workspace_id, base_id, payload) VALUES ($1, $2, $3, $4)",
            self.table
        );
        let pool = self.pool.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(op = ?event.op, "no runtime for audit insert");
            return;
        };
        handle.spawn(async move {
            let result = sqlx::query(&sql)
                .bind(MetaTable::Audit.generate_id())
                .bind(&event.workspace_id)
                .bind(&event.base_id)
                .bind(payload)
                .execute(&pool)
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, op = ?event.op, "audit insert failed");
            }
        });
    }
}
