//! Explicit per-request context: every collaborator the engine touches, plus the container scope.

use crate::audit::{AuditEvent, AuditSink, PgAuditSink, TracingAuditSink};
use crate::cache::{EntityCache, PgCacheBackend};
use crate::meta::Container;
use crate::model::{ColumnRepo, ModelRepo, ViewRepo};
use crate::relation::RelationManager;
use crate::schema::{PgSchemaExecutor, ReferentialAction, SchemaExecutor};
use crate::settings::{CacheKind, Settings};
use crate::store::{MetaStore, PgMetaStore};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct MetaContext {
    pub container: Container,
    pub store: Arc<dyn MetaStore>,
    pub cache: EntityCache,
    pub schema: Arc<dyn SchemaExecutor>,
    pub audit: Arc<dyn AuditSink>,
    /// User id recorded on audit events.
    pub actor: Option<String>,
    pub fk_on_update: ReferentialAction,
    pub fk_on_delete: ReferentialAction,
}

impl MetaContext {
    pub fn new(
        container: Container,
        store: Arc<dyn MetaStore>,
        cache: EntityCache,
        schema: Arc<dyn SchemaExecutor>,
    ) -> Self {
        MetaContext {
            container,
            store,
            cache,
            schema,
            audit: Arc::new(TracingAuditSink),
            actor: None,
            fk_on_update: ReferentialAction::NoAction,
            fk_on_delete: ReferentialAction::NoAction,
        }
    }

    /// PostgreSQL-backed context. Call `ensure_meta_tables` (and `ensure_cache_table` for a shared cache) first.
    pub fn postgres(pool: PgPool, settings: &Settings, container: Container) -> Self {
        let cache = match settings.cache {
            CacheKind::Memory => EntityCache::in_memory(),
            CacheKind::Postgres => {
                EntityCache::new(Arc::new(PgCacheBackend::new(pool.clone(), &settings.meta_schema)))
            }
        };
        let store = Arc::new(PgMetaStore::new(pool.clone(), settings.meta_schema.clone()));
        let schema = Arc::new(PgSchemaExecutor::new(pool.clone(), settings.data_schema.clone()));
        MetaContext::new(container, store, cache, schema)
            .with_audit(Arc::new(PgAuditSink::new(pool, &settings.meta_schema)))
            .with_referential_actions(settings.fk_on_update, settings.fk_on_delete)
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_referential_actions(mut self, on_update: ReferentialAction, on_delete: ReferentialAction) -> Self {
        self.fk_on_update = on_update;
        self.fk_on_delete = on_delete;
        self
    }

    /// Same collaborators, different base.
    pub fn for_container(&self, container: Container) -> Self {
        MetaContext {
            container,
            ..self.clone()
        }
    }

    pub fn models(&self) -> ModelRepo<'_> {
        ModelRepo::new(self)
    }

    pub fn columns(&self) -> ColumnRepo<'_> {
        ColumnRepo::new(self)
    }

    pub fn views(&self) -> ViewRepo<'_> {
        ViewRepo::new(self)
    }

    pub fn relations(&self) -> RelationManager<'_> {
        RelationManager::new(self)
    }

    pub(crate) fn audit_event(&self, event: AuditEvent) {
        self.audit.record(event);
    }
}
