//! In-process cache store built on `moka`.
//!
//! Mirrors the Redis semantics the storefront relies on: per-key TTLs, hash
//! fields updated atomically per key, `HDEL` leaving the TTL alone, and a hash
//! disappearing once its last field is removed.

use std::collections::HashMap;
use std::future::ready;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Entry;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::Op;

use super::{CacheError, CacheStore};

const MAX_ENTRIES: u64 = 100_000;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Instant,
}

impl Slot {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }
}

/// Expire each slot at its own deadline.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Slot,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.expires_at.saturating_duration_since(updated_at))
    }
}

/// Cache store held entirely in process memory.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: Cache<String, Slot>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(SlotExpiry)
            .build();
        Self { cache }
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| key == pattern, |prefix| key.starts_with(prefix))
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.cache.get(key).await {
            None => Ok(None),
            Some(Slot {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(CacheError::WrongType(key.to_owned())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_owned(), Slot::new(Value::Text(value.to_owned()), ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.cache.invalidate(key).await;
        }
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &doomed {
            self.cache.invalidate(key).await;
        }
        Ok(doomed.len() as u64)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        match self.cache.get(key).await {
            None => Ok(None),
            Some(Slot {
                value: Value::Hash(map),
                ..
            }) => Ok(map.get(field).cloned()),
            Some(_) => Err(CacheError::WrongType(key.to_owned())),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        match self.cache.get(key).await {
            None => Ok(HashMap::new()),
            Some(Slot {
                value: Value::Hash(map),
                ..
            }) => Ok(map),
            Some(_) => Err(CacheError::WrongType(key.to_owned())),
        }
    }

    async fn hash_set_with_ttl(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let field = field.to_owned();
        let value = value.to_owned();
        let mut wrong_type = false;

        self.cache
            .entry(key.to_owned())
            .and_compute_with(|current| {
                let op = match current.map(Entry::into_value) {
                    None => Op::Put(Slot::new(
                        Value::Hash(HashMap::from([(field, value)])),
                        ttl,
                    )),
                    Some(Slot {
                        value: Value::Hash(mut map),
                        ..
                    }) => {
                        map.insert(field, value);
                        Op::Put(Slot::new(Value::Hash(map), ttl))
                    }
                    Some(_) => {
                        wrong_type = true;
                        Op::Nop
                    }
                };
                ready(op)
            })
            .await;

        if wrong_type {
            return Err(CacheError::WrongType(key.to_owned()));
        }
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut wrong_type = false;

        self.cache
            .entry(key.to_owned())
            .and_compute_with(|current| {
                let op = match current.map(Entry::into_value) {
                    None => Op::Nop,
                    Some(Slot {
                        value: Value::Hash(mut map),
                        expires_at,
                    }) => {
                        map.remove(field);
                        if map.is_empty() {
                            Op::Remove
                        } else {
                            Op::Put(Slot {
                                value: Value::Hash(map),
                                expires_at,
                            })
                        }
                    }
                    Some(_) => {
                        wrong_type = true;
                        Op::Nop
                    }
                };
                ready(op)
            })
            .await;

        if wrong_type {
            return Err(CacheError::WrongType(key.to_owned()));
        }
        Ok(())
    }

    async fn hash_replace_with_ttl(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if fields.is_empty() {
            self.cache.invalidate(key).await;
            return Ok(());
        }

        let map: HashMap<String, String> = fields.iter().cloned().collect();
        self.cache
            .insert(key.to_owned(), Slot::new(Value::Hash(map), ttl))
            .await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_string_set_get_delete() {
        let store = MemoryCacheStore::new();
        store.set("product:1", "{}", TTL).await.unwrap();
        assert_eq!(store.get("product:1").await.unwrap().as_deref(), Some("{}"));

        store.delete(&["product:1".to_owned()]).await.unwrap();
        assert!(store.get("product:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hash_field_lifecycle() {
        let store = MemoryCacheStore::new();
        store.hash_set_with_ttl("cart:u", "p1", "a", TTL).await.unwrap();
        store.hash_set_with_ttl("cart:u", "p2", "b", TTL).await.unwrap();
        store.hash_set_with_ttl("cart:u", "p1", "c", TTL).await.unwrap();

        let all = store.hash_get_all("cart:u").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("p1").map(String::as_str), Some("c"));

        store.hash_delete("cart:u", "p1").await.unwrap();
        assert!(store.hash_get("cart:u", "p1").await.unwrap().is_none());
        assert_eq!(
            store.hash_get("cart:u", "p2").await.unwrap().as_deref(),
            Some("b")
        );

        store.hash_delete("cart:u", "p2").await.unwrap();
        assert!(store.hash_get_all("cart:u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hash_replace_drops_stale_fields() {
        let store = MemoryCacheStore::new();
        store.hash_set_with_ttl("cart:u", "p1", "1", TTL).await.unwrap();
        store.hash_set_with_ttl("cart:u", "p2", "5", TTL).await.unwrap();

        store
            .hash_replace_with_ttl("cart:u", &[("p1".to_owned(), "3".to_owned())], TTL)
            .await
            .unwrap();

        let all = store.hash_get_all("cart:u").await.unwrap();
        assert_eq!(all, HashMap::from([("p1".to_owned(), "3".to_owned())]));

        store.hash_replace_with_ttl("cart:u", &[], TTL).await.unwrap();
        assert!(store.hash_get_all("cart:u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryCacheStore::new();
        store.set("all_products", "[]", TTL).await.unwrap();

        let err = store
            .hash_set_with_ttl("all_products", "f", "v", TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::WrongType(_)));
        assert!(store.hash_get_all("all_products").await.is_err());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryCacheStore::new();
        store
            .set("product:short", "{}", Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.get("product:short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_matching_prefix() {
        let store = MemoryCacheStore::new();
        store.set("product:1", "{}", TTL).await.unwrap();
        store.set("product:2", "{}", TTL).await.unwrap();
        store.set("products_by_name:tea", "[]", TTL).await.unwrap();
        store.hash_set_with_ttl("cart:u", "p", "1", TTL).await.unwrap();

        let removed = store.delete_matching("product:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("products_by_name:tea").await.unwrap().is_some());
        assert!(!store.hash_get_all("cart:u").await.unwrap().is_empty());
    }
}
