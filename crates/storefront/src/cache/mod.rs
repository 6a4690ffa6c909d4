//! Key-value cache used for live carts and product reads.
//!
//! # Backends
//!
//! - [`RedisCacheStore`] - Redis via a multiplexed `ConnectionManager` (production)
//! - [`MemoryCacheStore`] - in-process `moka` cache with per-key expiry (tests, local dev)
//!
//! Both expose the same [`CacheStore`] capability set: string get/set with a TTL,
//! atomic hash-field operations, and pipelined hash writes that refresh the
//! key's TTL in the same round trip.

pub mod keys;
mod memory;
mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Transport or protocol error from Redis.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key holds a value of a different shape (string vs hash).
    #[error("wrong value type for key {0}")]
    WrongType(String),
}

/// Capability set required from the cache tier.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a string value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Delete every key matching a glob `pattern` (only trailing `*` wildcards
    /// are guaranteed across backends). Returns the number of keys removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Read one field of a hash.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Read every field of a hash. A missing key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Set one hash field and refresh the key's TTL in a single pipeline.
    async fn hash_set_with_ttl(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Delete one hash field. The key's TTL is left untouched.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError>;

    /// Atomically replace the whole hash with `fields` and set its TTL.
    ///
    /// An empty `fields` leaves the key deleted.
    async fn hash_replace_with_ttl(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Liveness check used by the readiness probe.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Backend whose every operation fails, for exercising cache-outage paths.
#[cfg(test)]
pub(crate) struct UnavailableCacheStore;

#[cfg(test)]
#[async_trait]
impl CacheStore for UnavailableCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn set(&self, key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        Err(CacheError::WrongType(keys.join(",")))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::WrongType(pattern.to_owned()))
    }

    async fn hash_get(&self, key: &str, _field: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn hash_set_with_ttl(
        &self,
        key: &str,
        _field: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn hash_delete(&self, key: &str, _field: &str) -> Result<(), CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn hash_replace_with_ttl(
        &self,
        key: &str,
        _fields: &[(String, String)],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::WrongType(key.to_owned()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::WrongType("ping".to_owned()))
    }
}
