use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use complyd_core::{DataAccessError, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::CategoryRegistry;

/// Upper bound on keys deleted per round trip during invalidation.
const DELETE_BATCH: usize = 100;

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

/// Per-category usage metadata, maintained alongside every set/delete
/// and read back verbatim by [`RedisCache::stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub entry_count: i64,
    pub total_size_bytes: i64,
    pub last_updated: Option<String>,
}

/// Aggregate facade statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: f64,
    pub categories: HashMap<String, CategoryUsage>,
}

/// Namespaced facade over a single network key-value store connection.
///
/// Every key reaching the store is `<namespace>:<category>:<key>`. All
/// read/write operations are fail-soft: a store error is logged,
/// counted, and surfaces as a miss or a `false`, never as an exception
/// on the caller's primary path.
pub struct RedisCache {
    conn: ConnectionManager,
    registry: CategoryRegistry,
    stats: CacheCounters,
}

impl RedisCache {
    /// Connects to the store. Construction failures are loud; the
    /// fail-soft contract starts after a facade exists.
    pub async fn connect(url: &str, registry: CategoryRegistry) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|err| DataAccessError::Configuration(format!("invalid cache url: {}", err)))?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url, "cache store connected");
        Ok(Self {
            conn,
            registry,
            stats: CacheCounters::default(),
        })
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Round-trip liveness probe against the store.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => true,
            Err(err) => {
                self.record_error("ping", &err);
                false
            }
        }
    }

    fn full_key(&self, category: &str, key: &str) -> (String, String) {
        let (resolved, config) = self.registry.resolve(category);
        (
            resolved.to_string(),
            format!("{}:{}:{}", config.namespace, resolved, key),
        )
    }

    fn meta_key(&self, category: &str) -> String {
        let (resolved, config) = self.registry.resolve(category);
        format!("{}:meta:{}", config.namespace, resolved)
    }

    fn record_error(&self, operation: &str, err: &redis::RedisError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(operation, error = %err, "cache operation failed");
    }

    /// Fetches and decodes a value. Misses, store errors, and decode
    /// failures all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, category: &str) -> Option<T> {
        let bytes = self.get_raw(key, category).await?;
        let (_, config) = self.registry.resolve(category);
        match codec::decode(&bytes, config) {
            Ok(value) => Some(value),
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, category, error = %err, "cached payload failed to decode");
                None
            }
        }
    }

    /// Raw fetch for callers that opt out of decoding.
    pub async fn get_raw(&self, key: &str, category: &str) -> Option<Vec<u8>> {
        let (_, full_key) = self.full_key(category, key);
        let mut conn = self.conn.clone();
        let fetched: redis::RedisResult<Option<Vec<u8>>> = conn.get(&full_key).await;
        match fetched {
            Ok(Some(bytes)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(bytes)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                self.record_error("get", &err);
                None
            }
        }
    }

    /// Encodes and stores a value with an explicit expiry: the override
    /// TTL when given, the category default otherwise. A set always
    /// re-establishes the TTL. Returns whether the write landed.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        category: &str,
        ttl: Option<u64>,
    ) -> bool {
        let (resolved, full_key) = self.full_key(category, key);
        let (_, config) = self.registry.resolve(category);

        let bytes = match codec::encode(value, config) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, category, error = %err, "cache payload failed to encode");
                return false;
            }
        };

        let ttl = ttl.unwrap_or(config.ttl_seconds);
        let size = bytes.len() as i64;
        let mut conn = self.conn.clone();
        let written: redis::RedisResult<()> = conn.set_ex(&full_key, bytes, ttl).await;
        match written {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                self.spawn_metadata_update(&resolved, 1, size);
                true
            }
            Err(err) => {
                self.record_error("set", &err);
                false
            }
        }
    }

    /// Namespaced delete. Fail-soft; returns whether a key was removed.
    pub async fn delete(&self, key: &str, category: &str) -> bool {
        let (resolved, full_key) = self.full_key(category, key);
        let mut conn = self.conn.clone();
        let removed: redis::RedisResult<i64> = conn.del(&full_key).await;
        match removed {
            Ok(count) => {
                self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                if count > 0 {
                    self.spawn_metadata_update(&resolved, -count, 0);
                }
                count > 0
            }
            Err(err) => {
                self.record_error("delete", &err);
                false
            }
        }
    }

    /// Namespaced existence probe. Fail-soft.
    pub async fn exists(&self, key: &str, category: &str) -> bool {
        let (_, full_key) = self.full_key(category, key);
        let mut conn = self.conn.clone();
        let found: redis::RedisResult<bool> = conn.exists(&full_key).await;
        match found {
            Ok(found) => found,
            Err(err) => {
                self.record_error("exists", &err);
                false
            }
        }
    }

    /// Cache-aside read: on a miss, the fetch future runs and its result
    /// is stored before being returned. A fetch error propagates and
    /// nothing is cached.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        category: &str,
        ttl: Option<u64>,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(key, category).await {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.set(key, &value, category, ttl).await;
        Ok(value)
    }

    /// [`get_or_set`](Self::get_or_set) for blocking fetchers: the
    /// closure runs on the blocking thread pool, so the caller does not
    /// choose a calling convention, the facade does.
    pub async fn get_or_set_blocking<T, F>(
        &self,
        key: &str,
        category: &str,
        ttl: Option<u64>,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if let Some(hit) = self.get::<T>(key, category).await {
            return Ok(hit);
        }
        let value = tokio::task::spawn_blocking(fetch)
            .await
            .map_err(|err| DataAccessError::Execution(format!("blocking fetch failed: {}", err)))??;
        self.set(key, &value, category, ttl).await;
        Ok(value)
    }

    /// Removes every key matching `pattern` under the category's
    /// namespace using cursor iteration (no full scans) and batched
    /// deletes. Returns the count removed.
    pub async fn invalidate_pattern(&self, pattern: &str, category: &str) -> usize {
        let (resolved, _) = self.full_key(category, pattern);
        let (_, config) = self.registry.resolve(category);
        let match_pattern = format!("{}:{}:{}", config.namespace, resolved, pattern);

        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let scanned: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&match_pattern)
                .arg("COUNT")
                .arg(DELETE_BATCH)
                .query_async(&mut conn)
                .await;
            let (next, keys) = match scanned {
                Ok(page) => page,
                Err(err) => {
                    self.record_error("invalidate_pattern", &err);
                    break;
                }
            };

            for batch in keys.chunks(DELETE_BATCH) {
                let deleted: redis::RedisResult<usize> = conn.del(batch.to_vec()).await;
                match deleted {
                    Ok(count) => removed += count,
                    Err(err) => self.record_error("invalidate_pattern", &err),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        if removed > 0 {
            self.stats
                .deletes
                .fetch_add(removed as u64, Ordering::Relaxed);
            self.spawn_metadata_update(&resolved, -(removed as i64), 0);
        }
        tracing::debug!(pattern = %match_pattern, removed, "invalidated cache keys");
        removed
    }

    /// TTL hygiene pass. Keys with no expiry (which `set` never
    /// produces) get the category default re-applied; missing keys are
    /// skipped silently. Returns the number of keys repaired.
    pub async fn cleanup_expired(&self, category: Option<&str>) -> usize {
        let categories: Vec<String> = match category {
            Some(name) => {
                let (resolved, _) = self.registry.resolve(name);
                vec![resolved.to_string()]
            }
            None => self.registry.names(),
        };

        let mut conn = self.conn.clone();
        let mut repaired = 0usize;
        for name in categories {
            let (_, config) = self.registry.resolve(&name);
            let match_pattern = format!("{}:{}:*", config.namespace, name);
            let default_ttl = config.ttl_seconds as i64;

            let mut cursor: u64 = 0;
            loop {
                let scanned: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&match_pattern)
                    .arg("COUNT")
                    .arg(DELETE_BATCH)
                    .query_async(&mut conn)
                    .await;
                let (next, keys) = match scanned {
                    Ok(page) => page,
                    Err(err) => {
                        self.record_error("cleanup_expired", &err);
                        return repaired;
                    }
                };

                for key in keys {
                    let remaining: redis::RedisResult<i64> = conn.ttl(&key).await;
                    match remaining {
                        // -1: key exists with no expiry
                        Ok(-1) => {
                            let applied: redis::RedisResult<bool> =
                                conn.expire(&key, default_ttl).await;
                            match applied {
                                Ok(_) => repaired += 1,
                                Err(err) => self.record_error("cleanup_expired", &err),
                            }
                        }
                        // -2: key vanished between scan and inspection
                        Ok(_) => {}
                        Err(err) => self.record_error("cleanup_expired", &err),
                    }
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }
        repaired
    }

    /// Counter snapshot plus the per-category metadata read back from
    /// the store.
    pub async fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        let mut categories = HashMap::new();
        let mut conn = self.conn.clone();
        for name in self.registry.names() {
            let meta_key = self.meta_key(&name);
            let fields: redis::RedisResult<HashMap<String, String>> =
                conn.hgetall(&meta_key).await;
            let usage = match fields {
                Ok(fields) if !fields.is_empty() => CategoryUsage {
                    entry_count: fields
                        .get("entry_count")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    total_size_bytes: fields
                        .get("total_size_bytes")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    last_updated: fields.get("last_updated").cloned(),
                },
                Ok(_) => CategoryUsage::default(),
                Err(err) => {
                    self.record_error("stats", &err);
                    CategoryUsage::default()
                }
            };
            categories.insert(name, usage);
        }

        CacheStats {
            hits,
            misses,
            errors: self.stats.errors.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            hit_rate,
            categories,
        }
    }

    fn spawn_metadata_update(&self, category: &str, delta_entries: i64, delta_bytes: i64) {
        let mut conn = self.conn.clone();
        let meta_key = self.meta_key(category);
        tokio::spawn(async move {
            let mut pipe = redis::pipe();
            pipe.hincr(&meta_key, "entry_count", delta_entries).ignore();
            pipe.hincr(&meta_key, "total_size_bytes", delta_bytes)
                .ignore();
            pipe.hset(&meta_key, "last_updated", Utc::now().to_rfc3339())
                .ignore();
            let updated: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
            if let Err(err) = updated {
                tracing::debug!(meta_key, error = %err, "category metadata update failed");
            }
        });
    }
}

/// Shared handle used across the layer.
pub type SharedCache = Arc<RedisCache>;
