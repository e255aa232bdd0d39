//! Entity cache: scoped objects and ordered lists with loaded/empty/unknown semantics.
//!
//! Objects are stored as `{ "value": <row>, "parents": [<list keys>] }` so a
//! child-to-parent cascade can find every list that references a key. Lists are
//! stored as `{ "list": [<object keys>] }`; a missing list entry means "never loaded".
//! Backend failures are logged and read as misses; nothing here returns an error.

mod backend;
mod keys;
mod pg;

pub use backend::{CacheBackend, MemoryCacheBackend};
pub use keys::{alias_key, list_key, object_key, CacheScope};
pub use pg::{ensure_cache_table, PgCacheBackend};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Entities the cache can store by id and collect into lists.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync {
    const SCOPE: CacheScope;

    fn cache_id(&self) -> &str;
}

/// Result of a list read. An empty `list` with `is_known_empty == false` means "go to the store".
#[derive(Clone, Debug, PartialEq)]
pub struct CachedList<T> {
    pub list: Vec<T>,
    pub is_known_empty: bool,
}

impl<T> CachedList<T> {
    fn not_loaded() -> Self {
        CachedList {
            list: Vec::new(),
            is_known_empty: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.is_known_empty || !self.list.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeDirection {
    /// Remove the object and its key from every list that references it.
    ChildToParent,
    /// Remove the object and everything cached under `<key>:*`.
    ParentToChild,
}

#[derive(Clone)]
pub struct EntityCache {
    backend: Arc<dyn CacheBackend>,
}

fn wrap(value: Value, parents: Vec<String>) -> Value {
    json!({ "value": value, "parents": parents })
}

fn parents_of(entry: &Value) -> Vec<String> {
    entry
        .get("parents")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|p| p.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn list_keys_of(entry: &Value) -> Option<Vec<String>> {
    entry
        .get("list")?
        .as_array()?
        .iter()
        .map(|k| k.as_str().map(String::from))
        .collect()
}

impl EntityCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        EntityCache { backend }
    }

    pub fn in_memory() -> Self {
        EntityCache::new(Arc::new(MemoryCacheBackend::new()))
    }

    async fn raw_get(&self, key: &str) -> Option<Value> {
        match self.backend.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache get failed");
                None
            }
        }
    }

    async fn raw_set(&self, key: &str, value: Value) {
        if let Err(e) = self.backend.set(key, value).await {
            tracing::warn!(key = %key, error = %e, "cache set failed");
        }
    }

    async fn raw_del(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.backend.del(keys).await {
            tracing::warn!(keys = ?keys, error = %e, "cache delete failed");
        }
    }

    /// Cached object at `key`, or `None` on a miss (callers then read the store).
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.raw_get(key).await?;
        let value = entry.get("value").filter(|v| !v.is_null())?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache entry does not decode; dropping");
                self.raw_del(&[key.to_string()]).await;
                None
            }
        }
    }

    /// Overwrite the whole object at `key`. List back-references are preserved.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_parent(key, value, None).await;
    }

    async fn set_with_parent<T: Serialize>(&self, key: &str, value: &T, parent: Option<&str>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache value does not serialize; invalidating");
                self.raw_del(&[key.to_string()]).await;
                return;
            }
        };
        let mut parents = match self.raw_get(key).await {
            Some(entry) => parents_of(&entry),
            None => Vec::new(),
        };
        if let Some(p) = parent {
            if !parents.iter().any(|x| x == p) {
                parents.push(p.to_string());
            }
        }
        self.raw_set(key, wrap(value, parents)).await;
    }

    /// Write without awaiting. For repopulating secondary keys nothing reads back in the same request.
    pub fn set_detached<T: Serialize>(&self, key: String, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => wrap(v, Vec::new()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache value does not serialize");
                return;
            }
        };
        let backend = Arc::clone(&self.backend);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = backend.set(&key, value).await {
                        tracing::warn!(key = %key, error = %e, "detached cache set failed");
                    }
                });
            }
            Err(_) => tracing::warn!(key = %key, "no runtime for detached cache set"),
        }
    }

    pub async fn get_list<T: Cacheable>(&self, args: &[&str]) -> CachedList<T> {
        let lkey = list_key(T::SCOPE, args);
        let Some(entry) = self.raw_get(&lkey).await else {
            return CachedList::not_loaded();
        };
        let Some(keys) = list_keys_of(&entry) else {
            tracing::warn!(key = %lkey, "malformed list entry; dropping");
            self.raw_del(&[lkey]).await;
            return CachedList::not_loaded();
        };
        if keys.is_empty() {
            return CachedList {
                list: Vec::new(),
                is_known_empty: true,
            };
        }
        let mut list = Vec::with_capacity(keys.len());
        for k in &keys {
            match self.get::<T>(k).await {
                Some(v) => list.push(v),
                None => {
                    tracing::debug!(list = %lkey, missing = %k, "list member evicted; reloading");
                    self.raw_del(&[lkey]).await;
                    return CachedList::not_loaded();
                }
            }
        }
        CachedList {
            list,
            is_known_empty: false,
        }
    }

    /// Mark the list loaded with `rows` (possibly none), caching each row as an object.
    pub async fn set_list<T: Cacheable>(&self, args: &[&str], rows: &[T]) {
        let lkey = list_key(T::SCOPE, args);
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let key = object_key(T::SCOPE, row.cache_id());
            self.set_with_parent(&key, row, Some(&lkey)).await;
            keys.push(key);
        }
        self.raw_set(&lkey, json!({ "list": keys })).await;
    }

    /// Append to a loaded list. Returns false, changing nothing, when the list was never loaded.
    pub async fn append_to_list<T: Cacheable>(&self, args: &[&str], row: &T) -> bool {
        let lkey = list_key(T::SCOPE, args);
        let Some(mut keys) = self.raw_get(&lkey).await.as_ref().and_then(list_keys_of) else {
            return false;
        };
        let key = object_key(T::SCOPE, row.cache_id());
        self.set_with_parent(&key, row, Some(&lkey)).await;
        if !keys.contains(&key) {
            keys.push(key);
        }
        self.raw_set(&lkey, json!({ "list": keys })).await;
        true
    }

    pub async fn del(&self, key: &str) {
        self.raw_del(&[key.to_string()]).await;
    }

    pub async fn del_list(&self, scope: CacheScope, args: &[&str]) {
        self.raw_del(&[list_key(scope, args)]).await;
    }

    /// Delete every key `<scope>:<pattern>`, `*` matching any run of characters.
    pub async fn del_all(&self, scope: CacheScope, pattern: &str) {
        let glob = format!("{}:{}", scope.as_str(), pattern);
        match self.backend.keys(&glob).await {
            Ok(keys) => self.raw_del(&keys).await,
            Err(e) => tracing::warn!(pattern = %glob, error = %e, "cache scan failed"),
        }
    }

    pub async fn deep_del(&self, key: &str, direction: CascadeDirection) {
        match direction {
            CascadeDirection::ChildToParent => {
                if let Some(entry) = self.raw_get(key).await {
                    for parent in parents_of(&entry) {
                        let Some(mut keys) = self.raw_get(&parent).await.as_ref().and_then(list_keys_of)
                        else {
                            continue;
                        };
                        keys.retain(|k| k != key);
                        self.raw_set(&parent, json!({ "list": keys })).await;
                    }
                }
                self.raw_del(&[key.to_string()]).await;
            }
            CascadeDirection::ParentToChild => {
                let glob = format!("{}:*", key);
                let mut keys = match self.backend.keys(&glob).await {
                    Ok(k) => k,
                    Err(e) => {
                        tracing::warn!(pattern = %glob, error = %e, "cache scan failed");
                        Vec::new()
                    }
                };
                // a list key takes its members with it
                if let Some(members) = self.raw_get(key).await.as_ref().and_then(list_keys_of) {
                    keys.extend(members);
                }
                keys.push(key.to_string());
                self.raw_del(&keys).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        title: String,
    }

    impl Cacheable for Row {
        const SCOPE: CacheScope = CacheScope::Column;

        fn cache_id(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str) -> Row {
        Row {
            id: id.into(),
            title: id.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn list_is_tri_state() {
        let cache = EntityCache::in_memory();
        let unknown = cache.get_list::<Row>(&["md_1"]).await;
        assert!(!unknown.is_known_empty);
        assert!(unknown.list.is_empty());

        cache.set_list::<Row>(&["md_1"], &[]).await;
        let empty = cache.get_list::<Row>(&["md_1"]).await;
        assert!(empty.is_known_empty);
        assert!(empty.list.is_empty());

        assert!(cache.append_to_list(&["md_1"], &row("a")).await);
        assert!(cache.append_to_list(&["md_1"], &row("b")).await);
        let populated = cache.get_list::<Row>(&["md_1"]).await;
        assert!(!populated.is_known_empty);
        assert_eq!(populated.list, vec![row("a"), row("b")]);
    }

    #[tokio::test]
    async fn append_to_unloaded_list_is_a_noop() {
        let cache = EntityCache::in_memory();
        assert!(!cache.append_to_list(&["md_1"], &row("a")).await);
        assert!(!cache.get_list::<Row>(&["md_1"]).await.is_loaded());
        assert_eq!(cache.get::<Row>("column:a").await, None);
    }

    #[tokio::test]
    async fn evicted_member_forces_reload() {
        let cache = EntityCache::in_memory();
        cache.set_list(&["md_1"], &[row("a"), row("b")]).await;
        cache.del("column:b").await;
        let l = cache.get_list::<Row>(&["md_1"]).await;
        assert!(!l.is_loaded());
    }

    #[tokio::test]
    async fn child_to_parent_prunes_every_list() {
        let cache = EntityCache::in_memory();
        cache.set_list(&["md_1"], &[row("a"), row("b")]).await;
        cache.set_list(&["md_1", "visible"], &[row("b")]).await;

        cache.deep_del("column:b", CascadeDirection::ChildToParent).await;

        assert_eq!(cache.get::<Row>("column:b").await, None);
        assert_eq!(cache.get_list::<Row>(&["md_1"]).await.list, vec![row("a")]);
        let visible = cache.get_list::<Row>(&["md_1", "visible"]).await;
        assert!(visible.is_known_empty);
    }

    #[tokio::test]
    async fn set_keeps_back_references() {
        let cache = EntityCache::in_memory();
        cache.set_list(&["md_1"], &[row("a")]).await;
        let mut renamed = row("a");
        renamed.title = "Renamed".into();
        cache.set("column:a", &renamed).await;
        cache.deep_del("column:a", CascadeDirection::ChildToParent).await;
        assert!(cache.get_list::<Row>(&["md_1"]).await.is_known_empty);
    }

    #[tokio::test]
    async fn parent_to_child_removes_prefixed_keys() {
        let cache = EntityCache::in_memory();
        cache.set("model:md_1", &row("md_1")).await;
        cache.set("model:md_1:extra", &row("x")).await;
        cache.set("model:md_2", &row("md_2")).await;
        cache.deep_del("model:md_1", CascadeDirection::ParentToChild).await;
        assert_eq!(cache.get::<Row>("model:md_1").await, None);
        assert_eq!(cache.get::<Row>("model:md_1:extra").await, None);
        assert_eq!(cache.get::<Row>("model:md_2").await, Some(row("md_2")));
    }

    #[tokio::test]
    async fn parent_to_child_on_a_list_removes_its_members() {
        let cache = EntityCache::in_memory();
        cache.set_list(&["md_1"], &[row("a"), row("b")]).await;
        cache.set_list(&["md_2"], &[row("c")]).await;

        cache
            .deep_del(&list_key(CacheScope::Column, &["md_1"]), CascadeDirection::ParentToChild)
            .await;

        assert_eq!(cache.get::<Row>("column:a").await, None);
        assert_eq!(cache.get::<Row>("column:b").await, None);
        assert!(!cache.get_list::<Row>(&["md_1"]).await.is_loaded());
        assert_eq!(cache.get_list::<Row>(&["md_2"]).await.list, vec![row("c")]);
    }

    #[tokio::test]
    async fn detached_set_lands_eventually() {
        let cache = EntityCache::in_memory();
        cache.set_detached("model:b1:Orders".into(), &"md_1");
        for _ in 0..50 {
            if cache.get::<String>("model:b1:Orders").await.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.get::<String>("model:b1:Orders").await.as_deref(), Some("md_1"));
    }

    #[tokio::test]
    async fn del_all_matches_scope_pattern() {
        let cache = EntityCache::in_memory();
        cache.set("model:b1:Orders", &"md_1").await;
        cache.set("model:b1:orders", &"md_1").await;
        cache.set("model:md_1", &row("md_1")).await;
        cache.del_all(CacheScope::Model, "b1:*").await;
        assert_eq!(cache.get::<String>("model:b1:Orders").await, None);
        assert!(cache.get::<Row>("model:md_1").await.is_some());
    }
}
