/// Process-wide façade over the relational and cache-store pools
///
/// Constructed once at startup and shared behind an `Arc` by every request
/// handler. Business code obtains connections only through this type.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::pool::{ConnectionPool, HealthReport, PoolSettings, PoolStats};
use super::PooledConnection;
use crate::backends::mysql::{MySqlConnector, RelationalConnection};
use crate::backends::redis::{CacheStoreConnection, RedisConnector};
use crate::config::Config;
use crate::error::{PoolError, PoolResult};
use crate::health::mysql::MySqlHealthChecker;
use crate::health::redis::RedisHealthChecker;

pub type RelationalPool = ConnectionPool<MySqlConnector>;
pub type CacheStorePool = ConnectionPool<RedisConnector>;

/// Outcome of one maintenance run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub relational: HealthReport,
    pub cache_store: HealthReport,
    pub reaped_relational: usize,
    pub reaped_cache_store: usize,
}

pub struct ConnectionPoolManager {
    config: Arc<Config>,
    relational: RelationalPool,
    cache_store: CacheStorePool,
    shut_down: AtomicBool,
}

impl ConnectionPoolManager {
    /// Build both pools from a validated configuration. No connections are opened.
    pub fn new(config: Config) -> Self {
        let pool_config = &config.pool;
        let health_timeout = pool_config.health_check_timeout();

        let relational = ConnectionPool::new(
            MySqlConnector::new(&config.database.relational, pool_config.connect_timeout()),
            Box::new(MySqlHealthChecker::new(health_timeout)),
            PoolSettings::relational(pool_config),
        );
        let cache_store = ConnectionPool::new(
            RedisConnector::new(&config.database.cache_store, pool_config.connect_timeout()),
            Box::new(RedisHealthChecker::new(health_timeout)),
            PoolSettings::cache_store(pool_config),
        );

        info!(
            "Connection pools ready (relational capacity {}, cache-store capacity {})",
            pool_config.relational_capacity, pool_config.cache_store_capacity
        );

        Self {
            config: Arc::new(config),
            relational,
            cache_store,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Load configuration and build the manager; a bad document is fatal
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> PoolResult<Self> {
        let config = Config::load_from_file(path)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn relational_pool(&self) -> &RelationalPool {
        &self.relational
    }

    pub fn cache_store_pool(&self) -> &CacheStorePool {
        &self.cache_store
    }

    pub async fn get_relational_connection(
        &self,
    ) -> PoolResult<PooledConnection<RelationalConnection>> {
        self.relational.acquire().await
    }

    pub async fn release_relational_connection(
        &self,
        conn: PooledConnection<RelationalConnection>,
    ) -> Result<(), PooledConnection<RelationalConnection>> {
        self.relational.release(conn).await
    }

    /// Acquire a cache-store connection bound to the namespace of `logical_name`.
    ///
    /// `Ok(None)` means the name is unmapped or the namespace could not be
    /// selected; callers treat it as "no cache available".
    pub async fn get_cache_store_connection(
        &self,
        logical_name: &str,
    ) -> PoolResult<Option<PooledConnection<CacheStoreConnection>>> {
        if logical_name.is_empty() {
            return Err(PoolError::invalid_argument(
                "a logical cache-store name is required",
            ));
        }

        let Some(db) = self.config.database.cache_store.resolve(logical_name) else {
            warn!("Unknown logical cache-store name '{}'", logical_name);
            return Ok(None);
        };

        let mut conn = self.cache_store.acquire().await?;

        if conn.selected_db() != Some(db) {
            if let Err(e) = conn.select(db).await {
                warn!("SELECT {} for '{}' failed: {}", db, logical_name, e);
                let _ = self.cache_store.release(conn).await;
                return Ok(None);
            }
        }

        debug!(
            "Cache-store connection {} bound to '{}' (db {})",
            conn.entry_id(),
            logical_name,
            db
        );
        Ok(Some(conn))
    }

    pub async fn release_cache_store_connection(
        &self,
        conn: PooledConnection<CacheStoreConnection>,
    ) -> Result<(), PooledConnection<CacheStoreConnection>> {
        self.cache_store.release(conn).await
    }

    /// Flush the general cache namespace. Any failure degrades to `false`.
    pub async fn flush_cache_store(&self) -> bool {
        let logical_name = &self.config.cache.logical_name;

        let mut conn = match self.get_cache_store_connection(logical_name).await {
            Ok(Some(conn)) => conn,
            Ok(None) => return false,
            Err(e) => {
                warn!("Cache flush skipped, cache store unavailable: {}", e);
                return false;
            }
        };

        let flushed = match conn.flush_db().await {
            Ok(()) => true,
            Err(e) => {
                warn!("FLUSHDB on '{}' failed: {}", logical_name, e);
                false
            }
        };

        let _ = self.cache_store.release(conn).await;
        if flushed {
            info!("Flushed cache namespace '{}'", logical_name);
        }
        flushed
    }

    /// Health-scan both pools, then reap idle connections
    pub async fn perform_maintenance(&self) -> MaintenanceReport {
        let relational = self.relational.health_scan().await;
        let cache_store = self.cache_store.health_scan().await;
        let reaped_relational = self.relational.reap_idle().await;
        let reaped_cache_store = self.cache_store.reap_idle().await;

        let report = MaintenanceReport {
            relational,
            cache_store,
            reaped_relational,
            reaped_cache_store,
        };
        info!("Maintenance finished: {:?}", report);
        report
    }

    /// Close every pooled connection. Only the first call does any work.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let relational = self.relational.force_cleanup().await;
        let cache_store = self.cache_store.force_cleanup().await;
        info!(
            "Connection pools shut down ({} relational, {} cache-store entries removed)",
            relational, cache_store
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> (PoolStats, PoolStats) {
        (self.relational.stats().await, self.cache_store.stats().await)
    }
}
