/// Cache-aside read/write/invalidate protocol
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::key::{CacheKeyStrategy, CacheType, WritePolicy};
use super::{CacheLookup, CacheWrite};
use crate::backends::redis::CacheStoreConnection;
use crate::core::{ConnectionPoolManager, PooledConnection};

/// Best-effort cache in front of business reads. Never returns an error.
#[derive(Clone)]
pub struct CacheAsideAccessor {
    manager: Arc<ConnectionPoolManager>,
    keys: CacheKeyStrategy,
    logical_name: String,
}

impl CacheAsideAccessor {
    pub fn new(manager: Arc<ConnectionPoolManager>) -> Self {
        let cache = &manager.config().cache;
        let keys = CacheKeyStrategy::new(cache.key_prefix.clone(), cache.key_version);
        let logical_name = cache.logical_name.clone();

        Self {
            manager,
            keys,
            logical_name,
        }
    }

    pub fn key_strategy(&self) -> &CacheKeyStrategy {
        &self.keys
    }

    async fn connection(&self) -> Option<PooledConnection<CacheStoreConnection>> {
        match self.manager.get_cache_store_connection(&self.logical_name).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!("Cache store unavailable: {}", e);
                None
            }
        }
    }

    async fn release(&self, conn: PooledConnection<CacheStoreConnection>) {
        let _ = self.manager.release_cache_store_connection(conn).await;
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        raw_key: &str,
        cache_type: &CacheType,
    ) -> CacheLookup<T> {
        let Some(mut conn) = self.connection().await else {
            return CacheLookup::Unavailable;
        };

        let key = self.keys.physical_key(raw_key, cache_type);
        let fetched = conn.get(&key).await;
        self.release(conn).await;

        match fetched {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => CacheLookup::Hit(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    CacheLookup::Miss
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                warn!("Cache GET {} failed: {}", key, e);
                CacheLookup::Unavailable
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        raw_key: &str,
        value: &T,
        ttl: Duration,
        cache_type: &CacheType,
    ) -> CacheWrite {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Refusing to cache unserializable {} value: {}", cache_type, e);
                return CacheWrite::Rejected;
            }
        };

        let Some(mut conn) = self.connection().await else {
            return CacheWrite::Unavailable;
        };

        let key = self.keys.physical_key(raw_key, cache_type);
        let outcome = Self::write(&mut conn, &key, &payload, ttl, cache_type.write_policy()).await;
        self.release(conn).await;
        outcome
    }

    async fn write(
        conn: &mut CacheStoreConnection,
        key: &str,
        payload: &[u8],
        ttl: Duration,
        policy: WritePolicy,
    ) -> CacheWrite {
        let written = match policy {
            WritePolicy::Overwrite => conn.set_ex(key, payload, ttl).await.map(|()| true),
            WritePolicy::SkipIfPresent => conn.set_nx_ex(key, payload, ttl).await,
        };

        match written {
            Ok(true) => CacheWrite::Written,
            Ok(false) => {
                debug!("Cache slot {} already populated", key);
                CacheWrite::AlreadyPresent
            }
            Err(e) => {
                warn!("Cache SET {} failed: {}", key, e);
                CacheWrite::Unavailable
            }
        }
    }

    /// Flush the cache namespace after a write to the relational store
    pub async fn invalidate_all(&self) -> bool {
        self.manager.flush_cache_store().await
    }

    /// Serve from cache, otherwise run `loader` and cache a non-empty result.
    ///
    /// Loader errors propagate unchanged and nothing is cached for them.
    pub async fn load_through<T, E, F, Fut>(
        &self,
        raw_key: &str,
        cache_type: &CacheType,
        ttl: Duration,
        loader: F,
    ) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if let CacheLookup::Hit(rows) = self.get::<Vec<T>>(raw_key, cache_type).await {
            return Ok(rows);
        }

        let rows = loader().await?;
        if !rows.is_empty() {
            self.set(raw_key, &rows, ttl, cache_type).await;
        }
        Ok(rows)
    }
}
