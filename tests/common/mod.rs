//! Shared fixtures: in-process collaborators that record what the engine asked of them.

#![allow(dead_code)]

use architect_meta::audit::{AuditEvent, AuditSink};
use architect_meta::cache::CacheBackend;
use architect_meta::error::{CacheError, SchemaError, StoreError};
use architect_meta::meta::{Container, MetaTable, Model};
use architect_meta::schema::{ForeignKeySpec, PhysicalColumn, SchemaExecutor, TableSpec};
use architect_meta::store::{Filter, MemoryMetaStore, MetaStore, OrderBy};
use architect_meta::{EntityCache, MetaContext, NewColumn, NewModel};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaCall {
    AddColumn { table: String, column: String },
    DropColumn { table: String, column: String },
    AddForeignKey { table: String, column: String, constraint: Option<String> },
    DropForeignKey { table: String, column: String, constraint: Option<String> },
    CreateTable { table: String, columns: Vec<String> },
    DropTable { table: String },
}

/// Records every DDL call. With `failing` set, each call is recorded and then rejected.
#[derive(Default)]
pub struct RecordingSchemaExecutor {
    calls: Mutex<Vec<SchemaCall>>,
    failing: bool,
}

impl RecordingSchemaExecutor {
    pub fn failing() -> Self {
        RecordingSchemaExecutor {
            calls: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn calls(&self) -> Vec<SchemaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: SchemaCall) -> Result<(), SchemaError> {
        self.calls.lock().unwrap().push(call);
        if self.failing {
            return Err(SchemaError::Rejected("executor configured to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaExecutor for RecordingSchemaExecutor {
    async fn add_column(&self, table: &str, column: &PhysicalColumn) -> Result<(), SchemaError> {
        self.record(SchemaCall::AddColumn {
            table: table.into(),
            column: column.name.clone(),
        })
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<(), SchemaError> {
        self.record(SchemaCall::DropColumn {
            table: table.into(),
            column: column.into(),
        })
    }

    async fn add_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError> {
        self.record(SchemaCall::AddForeignKey {
            table: fk.child_table.clone(),
            column: fk.child_column.clone(),
            constraint: fk.constraint_name.clone(),
        })
    }

    async fn drop_foreign_key(&self, fk: &ForeignKeySpec) -> Result<(), SchemaError> {
        self.record(SchemaCall::DropForeignKey {
            table: fk.child_table.clone(),
            column: fk.child_column.clone(),
            constraint: fk.constraint_name.clone(),
        })
    }

    async fn create_table(&self, table: &TableSpec) -> Result<(), SchemaError> {
        self.record(SchemaCall::CreateTable {
            table: table.name.clone(),
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
        })
    }

    async fn drop_table(&self, table: &str) -> Result<(), SchemaError> {
        self.record(SchemaCall::DropTable { table: table.into() })
    }
}

#[derive(Default)]
pub struct CollectingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl CollectingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for CollectingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cache backend whose every call errors, as when the cache server is unreachable.
pub struct UnreachableCache;

fn unreachable() -> CacheError {
    CacheError::Db(sqlx::Error::Protocol("cache unreachable".into()))
}

#[async_trait]
impl CacheBackend for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Err(unreachable())
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), CacheError> {
        Err(unreachable())
    }

    async fn del(&self, _keys: &[String]) -> Result<(), CacheError> {
        Err(unreachable())
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Err(unreachable())
    }
}

/// Memory store that counts reads, to tell cache hits from store round trips.
/// Can be armed to reject the nth upcoming insert into one table.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryMetaStore,
    reads: AtomicUsize,
    fail_insert: Mutex<Option<(MetaTable, usize)>>,
}

impl CountingStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Reject the `nth` (1-based) insert into `table` from now on; earlier ones pass.
    pub fn fail_insert(&self, table: MetaTable, nth: usize) {
        *self.fail_insert.lock().unwrap() = Some((table, nth));
    }

    fn insert_allowed(&self, table: MetaTable) -> bool {
        let mut armed = self.fail_insert.lock().unwrap();
        match armed.as_mut() {
            Some((t, remaining)) if *t == table => {
                *remaining -= 1;
                if *remaining == 0 {
                    *armed = None;
                    return false;
                }
                true
            }
            _ => true,
        }
    }
}

#[async_trait]
impl MetaStore for CountingStore {
    async fn get(&self, c: &Container, t: MetaTable, f: &Filter) -> Result<Option<Value>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(c, t, f).await
    }

    async fn list(
        &self,
        c: &Container,
        t: MetaTable,
        f: &Filter,
        o: Option<&OrderBy>,
    ) -> Result<Vec<Value>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list(c, t, f, o).await
    }

    async fn insert(&self, c: &Container, t: MetaTable, row: Value) -> Result<String, StoreError> {
        if !self.insert_allowed(t) {
            return Err(StoreError::Db(sqlx::Error::Protocol(format!(
                "insert into {} rejected",
                t.name()
            ))));
        }
        self.inner.insert(c, t, row).await
    }

    async fn update(&self, c: &Container, t: MetaTable, patch: Value, f: &Filter) -> Result<u64, StoreError> {
        self.inner.update(c, t, patch, f).await
    }

    async fn delete(&self, c: &Container, t: MetaTable, f: &Filter) -> Result<u64, StoreError> {
        self.inner.delete(c, t, f).await
    }

    async fn count(&self, c: &Container, t: MetaTable, f: &Filter) -> Result<u64, StoreError> {
        self.inner.count(c, t, f).await
    }
}

pub struct Harness {
    pub ctx: MetaContext,
    pub store: Arc<CountingStore>,
    pub schema: Arc<RecordingSchemaExecutor>,
    pub audit: Arc<CollectingAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Harness::with_schema(RecordingSchemaExecutor::default())
    }

    pub fn with_schema(schema: RecordingSchemaExecutor) -> Self {
        Harness::build(schema, EntityCache::in_memory())
    }

    /// Every cache call fails; reads fall through to the store.
    pub fn with_unreachable_cache() -> Self {
        Harness::build(
            RecordingSchemaExecutor::default(),
            EntityCache::new(Arc::new(UnreachableCache)),
        )
    }

    fn build(schema: RecordingSchemaExecutor, cache: EntityCache) -> Self {
        let store = Arc::new(CountingStore::default());
        let schema = Arc::new(schema);
        let audit = Arc::new(CollectingAuditSink::default());
        let ctx = MetaContext::new(
            Container::new("ws_test", "base_test"),
            store.clone(),
            cache,
            schema.clone(),
        )
        .with_audit(audit.clone())
        .with_actor("us_tester");
        Harness {
            ctx,
            store,
            schema,
            audit,
        }
    }

    /// Rows of a metadata table in the harness container.
    pub async fn rows(&self, table: MetaTable) -> Vec<Value> {
        self.store
            .inner
            .list(&self.ctx.container, table, &Filter::new(), None)
            .await
            .unwrap()
    }

    /// `Title` over `table` with an integer `id` primary key and a text `name` display column.
    pub async fn table(&self, title: &str, table: &str) -> Model {
        self.ctx
            .models()
            .insert(NewModel::new(title, table).with_columns(vec![
                NewColumn::primary_key("Id", "id", "integer"),
                NewColumn::physical("Name", "name", "text").display_value(),
            ]))
            .await
            .unwrap()
    }

    pub async fn model(&self, id: &str) -> Model {
        self.ctx.models().get_with_info(id).await.unwrap().unwrap()
    }
}

pub fn titles(model: &Model) -> Vec<&str> {
    model.columns.iter().map(|c| c.title.as_str()).collect()
}
