//! Shared cache backend on a `_sys_cache` key/value table.

use super::backend::CacheBackend;
use crate::error::CacheError;
use crate::store::quote_ident;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

pub async fn ensure_cache_table(pool: &PgPool, schema: &str) -> Result<(), CacheError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .execute(pool)
        .await?;
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}._sys_cache (
            key TEXT PRIMARY KEY,
            value JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        quote_ident(schema)
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}

/// `*` glob to a LIKE pattern, escaping LIKE's own wildcards.
fn like_pattern(glob: &str) -> String {
    glob.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('*', "%")
}

pub struct PgCacheBackend {
    pool: PgPool,
    table: String,
}

impl PgCacheBackend {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgCacheBackend {
            pool,
            table: format!("{}._sys_cache", quote_ident(schema)),
        }
    }
}

#[async_trait]
impl CacheBackend for PgCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let sql = format!("SELECT value FROM {} WHERE key = $1", self.table);
        let row: Option<(Value,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let sql = format!(
            "INSERT INTO {} (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            self.table
        );
        sqlx::query(&sql).bind(key).bind(value).execute(&self.pool).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let sql = format!("DELETE FROM {} WHERE key = ANY($1)", self.table);
        sqlx::query(&sql).bind(keys).execute(&self.pool).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let sql = format!("SELECT key FROM {} WHERE key LIKE $1 ORDER BY key", self.table);
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(like_pattern(pattern))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn glob_to_like() {
        assert_eq!(like_pattern("view_column:*"), "view\\_column:%");
        assert_eq!(like_pattern("model:b%1:*"), "model:b\\%1:%");
    }
}
