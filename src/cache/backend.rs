//! Key/value backends behind the entity cache.

use crate::error::CacheError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;
    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;
    /// Keys matching a glob where `*` stands for any run of characters.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}

/// Anchored regex for a `*` glob.
pub(crate) fn glob_regex(pattern: &str) -> Result<Regex, CacheError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Ok(Regex::new(&format!("^{}$", body))?)
}

#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        MemoryCacheBackend::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        for k in keys {
            entries.remove(k);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let re = glob_regex(pattern)?;
        let entries = self.entries.read().await;
        let mut out: Vec<String> = entries.keys().filter(|k| re.is_match(k)).cloned().collect();
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn glob_escapes_everything_but_star() {
        let re = glob_regex("model:b.1:*").unwrap();
        assert!(re.is_match("model:b.1:list"));
        assert!(!re.is_match("model:bx1:list"));
        assert!(!re.is_match("xmodel:b.1:list"));
    }

    #[tokio::test]
    async fn pattern_scan_and_delete() -> Result<(), CacheError> {
        let b = MemoryCacheBackend::new();
        b.set("column:md_1:list", json!({ "list": [] })).await?;
        b.set("column:cl_1", json!({ "value": 1 })).await?;
        b.set("model:md_1", json!({ "value": 2 })).await?;
        let keys = b.keys("column:*").await?;
        assert_eq!(keys, vec!["column:cl_1".to_string(), "column:md_1:list".to_string()]);
        b.del(&keys).await?;
        assert_eq!(b.len().await, 1);
        assert!(b.get("model:md_1").await?.is_some());
        Ok(())
    }
}
