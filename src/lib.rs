//! Architect Meta: relational metadata engine for user-defined tables, columns, views and relations.
//!
//! Metadata rows live behind [`MetaStore`], reads go through the [`EntityCache`], and physical
//! schema changes are issued through a [`SchemaExecutor`]. [`MetaContext`] carries all three.

pub mod audit;
pub mod cache;
pub mod error;
pub mod logging;
pub mod meta;
pub mod model;
pub mod relation;
pub mod schema;
pub mod settings;
pub mod state;
pub mod store;

pub use audit::{AuditEvent, AuditOp, AuditSink, PgAuditSink, TracingAuditSink};
pub use cache::{ensure_cache_table, CacheBackend, EntityCache, MemoryCacheBackend, PgCacheBackend};
pub use error::{CacheError, ConfigError, MetaError, SchemaError, StoreError};
pub use logging::init_tracing;
pub use meta::{Column, ColumnKind, Container, Model, RelationDescriptor, RelationKind, View};
pub use model::{ColumnPatch, NewColumn, NewModel, NewView};
pub use relation::{Link, LinkRequest, ManyToMany, ManyToManyRequest, RelationManager};
pub use schema::{PgSchemaExecutor, ReferentialAction, SchemaExecutor};
pub use settings::{CacheKind, Settings};
pub use state::MetaContext;
pub use store::{ensure_database_exists, ensure_meta_tables, MemoryMetaStore, MetaStore, PgMetaStore};
