//! # Cache
//!
//! Cache-aside facade in front of Postgres reads.
//!
//! Values are stored as JSON strings. Every operation swallows backend
//! failures: the error is logged and the operation returns its safe default
//! (`None`, `false`, `0` or an empty vec), so a cache outage only ever looks
//! like a cache miss.
//!
//! ## Backends
//!
//! - `Redis`: shared cache through a reconnecting `ConnectionManager`
//! - `Memory`: in-process store, used when `REDIS_URL` is unset
//! - `Disconnected`: every call is a no-op returning the default

pub mod keys;
pub mod memory;

pub use keys::{CacheKeys, CacheTtl};
pub use memory::MemoryStore;

use crate::config::CacheConfig;
use memory::MemoryError;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised inside the cache. Never leave this module.
#[derive(Error, Debug)]
enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("memory store error: {0}")]
    Memory(#[from] MemoryError),

    #[error("cache is disconnected")]
    Disconnected,
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<MemoryStore>),
    Disconnected,
}

/// Cloneable handle to the configured cache backend
#[derive(Clone)]
pub struct CacheService {
    backend: Backend,
    prefix: Arc<str>,
    healthy: Arc<AtomicBool>,
}

impl CacheService {
    /// Connect according to `config`.
    ///
    /// A Redis that cannot be reached at startup yields a disconnected cache
    /// rather than an error.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Cache disabled by configuration");
            return Self::disconnected(&config.key_prefix);
        }

        let Some(url) = config.redis_url.as_deref() else {
            info!("REDIS_URL not set, using in-process memory cache");
            return Self::memory(&config.key_prefix);
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!("Invalid REDIS_URL, cache disabled: {}", e);
                return Self::disconnected(&config.key_prefix);
            }
        };

        match tokio::time::timeout(config.connect_timeout(), client.get_connection_manager()).await {
            Ok(Ok(manager)) => {
                info!("Connected to Redis cache");
                Self::with_backend(Backend::Redis(manager), &config.key_prefix, true)
            }
            Ok(Err(e)) => {
                warn!("Redis unavailable, cache disabled: {}", e);
                Self::disconnected(&config.key_prefix)
            }
            Err(_) => {
                warn!(
                    "Redis connection timed out after {}ms, cache disabled",
                    config.connect_timeout_ms
                );
                Self::disconnected(&config.key_prefix)
            }
        }
    }

    /// In-process cache
    pub fn memory(prefix: &str) -> Self {
        Self::with_backend(Backend::Memory(Arc::new(MemoryStore::new())), prefix, true)
    }

    /// Cache whose every operation is a no-op
    pub fn disconnected(prefix: &str) -> Self {
        Self::with_backend(Backend::Disconnected, prefix, false)
    }

    fn with_backend(backend: Backend, prefix: &str, healthy: bool) -> Self {
        Self {
            backend,
            prefix: Arc::from(prefix),
            healthy: Arc::new(AtomicBool::new(healthy)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
            Backend::Disconnected => "disconnected",
        }
    }

    /// Sweep expired entries out of the in-process store.
    ///
    /// Redis expires keys itself, so only the memory backend does any work.
    pub fn purge_expired(&self) -> usize {
        match &self.backend {
            Backend::Memory(store) => store.purge_expired(),
            Backend::Redis(_) | Backend::Disconnected => 0,
        }
    }

    /// False when disconnected or when the last Redis call failed
    pub fn is_connected(&self) -> bool {
        !matches!(self.backend, Backend::Disconnected) && self.healthy.load(Ordering::Relaxed)
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    /// Log a failed operation and hand back its default
    fn degrade<T>(&self, op: &str, key: &str, result: Result<T, CacheError>, default: T) -> T {
        match result {
            Ok(value) => {
                if matches!(self.backend, Backend::Redis(_)) {
                    self.healthy.store(true, Ordering::Relaxed);
                }
                value
            }
            Err(CacheError::Disconnected) => {
                debug!("Cache {} skipped for {}: disconnected", op, key);
                default
            }
            Err(e) => {
                if matches!(e, CacheError::Redis(_)) {
                    self.healthy.store(false, Ordering::Relaxed);
                }
                warn!("Cache {} failed for {}: {}", op, key, e);
                default
            }
        }
    }

    // =========================================================================
    // Raw string operations
    // =========================================================================

    async fn raw_get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
                Ok(value)
            }
            Backend::Memory(store) => Ok(store.get(key)?),
            Backend::Disconnected => Err(CacheError::Disconnected),
        }
    }

    async fn raw_set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value);
                if ttl_secs > 0 {
                    cmd.arg("EX").arg(ttl_secs);
                }
                let _: () = cmd.query_async(&mut conn).await?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.set(key, value, ttl_secs);
                Ok(())
            }
            Backend::Disconnected => Err(CacheError::Disconnected),
        }
    }

    async fn raw_delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
                Ok(removed)
            }
            Backend::Memory(store) => Ok(keys.iter().filter(|k| store.delete(k)).count() as u64),
            Backend::Disconnected => Err(CacheError::Disconnected),
        }
    }

    async fn raw_delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let mut cursor: u64 = 0;
                let mut removed: u64 = 0;
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn)
                        .await?;
                    if !batch.is_empty() {
                        let n: u64 = redis::cmd("DEL").arg(&batch).query_async(&mut conn).await?;
                        removed += n;
                    }
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Ok(removed)
            }
            Backend::Memory(store) => Ok(store.delete_pattern(pattern)),
            Backend::Disconnected => Err(CacheError::Disconnected),
        }
    }

    // =========================================================================
    // Facade
    // =========================================================================

    /// Fetch and deserialize a value; undecodable values count as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full = self.full_key(key);
        let raw = self.raw_get(&full).await;
        let raw = self.degrade("get", &full, raw, None)?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache value at {} could not be decoded: {}", full, e);
                None
            }
        }
    }

    /// Serialize and store a value. `ttl_secs == 0` stores without expiry.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        let full = self.full_key(key);
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cache value for {} could not be encoded: {}", full, e);
                return false;
            }
        };
        let result = self.raw_set(&full, json, ttl_secs).await.map(|_| true);
        self.degrade("set", &full, result, false)
    }

    /// True if a key was removed
    pub async fn delete(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let result = self.raw_delete(std::slice::from_ref(&full)).await.map(|n| n > 0);
        self.degrade("delete", &full, result, false)
    }

    /// Remove several keys at once; returns how many existed
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let label = full.first().cloned().unwrap_or_default();
        let result = self.raw_delete(&full).await;
        self.degrade("delete_many", &label, result, 0)
    }

    /// Remove every key matching a `*` glob; returns how many were removed
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let full = self.full_key(pattern);
        let result = self.raw_delete_pattern(&full).await;
        self.degrade("delete_pattern", &full, result, 0)
    }

    pub async fn exists(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<u64> = redis::cmd("EXISTS")
                    .arg(&full)
                    .query_async(&mut conn)
                    .await;
                reply.map(|n| n > 0).map_err(CacheError::from)
            }
            Backend::Memory(store) => Ok(store.exists(&full)),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("exists", &full, result, false)
    }

    /// Seconds until `key` expires; `None` when it is missing or never expires
    pub async fn ttl(&self, key: &str) -> Option<u64> {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<i64> =
                    redis::cmd("TTL").arg(&full).query_async(&mut conn).await;
                reply
                    .map(|secs| u64::try_from(secs).ok())
                    .map_err(CacheError::from)
            }
            Backend::Memory(store) => Ok(store.ttl(&full)),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("ttl", &full, result, None)
    }

    /// Reset the TTL of an existing key
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<u64> = redis::cmd("EXPIRE")
                    .arg(&full)
                    .arg(ttl_secs)
                    .query_async(&mut conn)
                    .await;
                reply.map(|n| n > 0).map_err(CacheError::from)
            }
            Backend::Memory(store) => Ok(store.expire(&full, ttl_secs)),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("expire", &full, result, false)
    }

    /// Fetch several values; the result has one slot per requested key
    pub async fn m_get<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<Vec<Option<String>>> = redis::cmd("MGET")
                    .arg(&full)
                    .query_async(&mut conn)
                    .await;
                reply.map_err(CacheError::from)
            }
            Backend::Memory(store) => full
                .iter()
                .map(|k| store.get(k))
                .collect::<Result<Vec<_>, _>>()
                .map_err(CacheError::from),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };

        let raw = self.degrade("m_get", &full[0], result, vec![None; full.len()]);
        raw.into_iter()
            .zip(full.iter())
            .map(|(value, key)| {
                value.and_then(|json| match serde_json::from_str::<T>(&json) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("Cache value at {} could not be decoded: {}", key, e);
                        None
                    }
                })
            })
            .collect()
    }

    /// Store several values with one TTL
    pub async fn m_set<T: Serialize>(&self, entries: &[(String, T)], ttl_secs: u64) -> bool {
        if entries.is_empty() {
            return true;
        }
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::to_string(value) {
                Ok(json) => encoded.push((self.full_key(key), json)),
                Err(e) => {
                    warn!("Cache value for {} could not be encoded: {}", key, e);
                    return false;
                }
            }
        }
        let label = encoded[0].0.clone();

        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let mut pipe = redis::pipe();
                pipe.atomic();
                for (key, json) in &encoded {
                    let cmd = pipe.cmd("SET").arg(key).arg(json);
                    if ttl_secs > 0 {
                        cmd.arg("EX").arg(ttl_secs);
                    }
                    cmd.ignore();
                }
                let reply: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
                reply.map(|_| true).map_err(CacheError::from)
            }
            Backend::Memory(store) => {
                for (key, json) in encoded {
                    store.set(&key, json, ttl_secs);
                }
                Ok(true)
            }
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("m_set", &label, result, false)
    }

    /// Atomically add `by` to an integer counter, creating it at 0
    pub async fn increment(&self, key: &str, by: i64) -> i64 {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<i64> = redis::cmd("INCRBY")
                    .arg(&full)
                    .arg(by)
                    .query_async(&mut conn)
                    .await;
                reply.map_err(CacheError::from)
            }
            Backend::Memory(store) => store.increment(&full, by).map_err(CacheError::from),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("increment", &full, result, 0)
    }

    /// Add members to a set; returns how many were new
    pub async fn s_add(&self, key: &str, members: &[String]) -> u64 {
        if members.is_empty() {
            return 0;
        }
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<u64> = redis::cmd("SADD")
                    .arg(&full)
                    .arg(members)
                    .query_async(&mut conn)
                    .await;
                reply.map_err(CacheError::from)
            }
            Backend::Memory(store) => store.s_add(&full, members).map_err(CacheError::from),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("s_add", &full, result, 0)
    }

    pub async fn s_members(&self, key: &str) -> Vec<String> {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<Vec<String>> = redis::cmd("SMEMBERS")
                    .arg(&full)
                    .query_async(&mut conn)
                    .await;
                reply.map_err(CacheError::from)
            }
            Backend::Memory(store) => store.s_members(&full).map_err(CacheError::from),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("s_members", &full, result, Vec::new())
    }

    pub async fn s_is_member(&self, key: &str, member: &str) -> bool {
        let full = self.full_key(key);
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let reply: redis::RedisResult<bool> = redis::cmd("SISMEMBER")
                    .arg(&full)
                    .arg(member)
                    .query_async(&mut conn)
                    .await;
                reply.map_err(CacheError::from)
            }
            Backend::Memory(store) => store.s_is_member(&full, member).map_err(CacheError::from),
            Backend::Disconnected => Err(CacheError::Disconnected),
        };
        self.degrade("s_is_member", &full, result, false)
    }

    /// Cache-aside read.
    ///
    /// Returns the cached value when present; otherwise runs `loader`,
    /// caches its result and returns it. Loader errors propagate, cache
    /// errors never do.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: CacheTtl, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            debug!("Cache hit: {}", key);
            return Ok(hit);
        }
        let value = loader().await?;
        self.set(key, &value, ttl.as_secs()).await;
        Ok(value)
    }

    /// Drop every per-user summary key for each of `user_ids`
    pub async fn invalidate_users(&self, user_ids: &[uuid::Uuid]) {
        let keys: Vec<String> = user_ids
            .iter()
            .flat_map(|id| CacheKeys::user_scope(*id))
            .collect();
        self.delete_many(&keys).await;
    }
}
