/// Generic connection pool for one backend kind
///
/// Entries are guarded by a single async mutex per pool. The lock is never held
/// across network I/O: connections are checked out of their entry (marked
/// unavailable) before being probed, opened or closed. Every checked-out
/// connection travels with an `EntryLease`, so a dropped future or handle
/// gives its slot back.
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{BackendKind, Connector, EntryLease, EntryTable, PooledConnection};
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::health::{probe, HealthChecker};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity and timing for one pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub capacity: usize,
    pub max_wait: Duration,
    pub retry_interval: Duration,
    pub idle_timeout: Duration,
}

impl PoolSettings {
    pub fn relational(config: &PoolConfig) -> Self {
        Self::with_capacity(config, config.relational_capacity)
    }

    pub fn cache_store(config: &PoolConfig) -> Self {
        Self::with_capacity(config, config.cache_store_capacity)
    }

    fn with_capacity(config: &PoolConfig, capacity: usize) -> Self {
        Self {
            capacity,
            max_wait: config.max_wait(),
            retry_interval: config.retry_interval(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// One managed connection
struct PoolEntry<C> {
    /// Present only while the entry sits idle in the pool
    connection: Option<C>,
    available: bool,
    created_at: Instant,
    last_used_at: Instant,
    usage_count: u64,
    health_check_count: u64,
}

struct PoolState<C> {
    entries: HashMap<u64, PoolEntry<C>>,
}

impl<C: Send + 'static> EntryTable for Mutex<PoolState<C>> {
    fn discard(self: Arc<Self>, entry_id: u64) {
        let removed = match self.try_lock() {
            Ok(mut state) => Some(state.entries.remove(&entry_id).is_some()),
            Err(_) => None,
        };

        match removed {
            Some(true) => warn!("Pool entry {} discarded without release", entry_id),
            Some(false) => {}
            // Lock is busy; finish the removal on the runtime
            None => match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if self.lock().await.entries.remove(&entry_id).is_some() {
                            warn!("Pool entry {} discarded without release", entry_id);
                        }
                    });
                }
                Err(_) => warn!("No runtime to discard pool entry {}", entry_id),
            },
        }
    }
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub kind: BackendKind,
    pub capacity: usize,
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
}

/// Result of a health scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub kind: BackendKind,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Lent to callers at scan time, not probed
    pub in_use: usize,
}

/// Per-entry view for operators
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub id: u64,
    pub available: bool,
    pub age: Duration,
    pub idle_for: Duration,
    pub usage_count: u64,
    pub health_check_count: u64,
}

enum CreateOutcome<C> {
    Created(PooledConnection<C>),
    AtCapacity,
    Failed(PoolError),
}

/// Releases a creation slot if `connect` fails or the acquiring future is dropped
struct CreateReservation<'a>(&'a AtomicUsize);

impl Drop for CreateReservation<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pool of connections produced by one `Connector`
pub struct ConnectionPool<K: Connector> {
    id: u64,
    connector: K,
    checker: Box<dyn HealthChecker<K::Connection>>,
    settings: PoolSettings,
    state: Arc<Mutex<PoolState<K::Connection>>>,
    /// Connections being opened; they count against capacity
    creating: AtomicUsize,
    next_entry_id: AtomicU64,
}

impl<K: Connector> ConnectionPool<K> {
    pub fn new(
        connector: K,
        checker: Box<dyn HealthChecker<K::Connection>>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            checker,
            settings,
            state: Arc::new(Mutex::new(PoolState {
                entries: HashMap::new(),
            })),
            creating: AtomicUsize::new(0),
            next_entry_id: AtomicU64::new(1),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.connector.kind()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Hand out a healthy connection, reusing idle ones first.
    ///
    /// At capacity, waits up to `max_wait`, re-checking every `retry_interval`.
    pub async fn acquire(&self) -> PoolResult<PooledConnection<K::Connection>> {
        if let Some(conn) = self.try_reuse().await {
            return Ok(conn);
        }

        match self.try_create().await {
            CreateOutcome::Created(conn) => return Ok(conn),
            CreateOutcome::Failed(e) => return Err(e),
            CreateOutcome::AtCapacity => {}
        }

        self.wait_for_connection().await
    }

    async fn wait_for_connection(&self) -> PoolResult<PooledConnection<K::Connection>> {
        let kind = self.kind();
        let started = Instant::now();
        debug!("{} pool at capacity ({}), waiting", kind, self.settings.capacity);

        loop {
            let waited = started.elapsed();
            if waited >= self.settings.max_wait {
                warn!("{} pool exhausted after {:?}", kind, waited);
                return Err(PoolError::PoolExhausted { kind, waited });
            }
            sleep(self.settings.retry_interval.min(self.settings.max_wait - waited)).await;

            if let Some(conn) = self.try_reuse().await {
                return Ok(conn);
            }

            self.reap_idle().await;

            match self.try_create().await {
                CreateOutcome::Created(conn) => return Ok(conn),
                CreateOutcome::Failed(e) => {
                    warn!("Retrying after {} connection failure: {}", kind, e);
                }
                CreateOutcome::AtCapacity => {}
            }
        }
    }

    /// Check out the most recently used idle entry, probe it and lend it.
    /// Unhealthy entries are removed and the scan continues.
    async fn try_reuse(&self) -> Option<PooledConnection<K::Connection>> {
        loop {
            let (entry_id, mut conn) = {
                let mut state = self.state.lock().await;
                let entry_id = state
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.available)
                    .max_by_key(|(_, entry)| entry.last_used_at)
                    .map(|(id, _)| *id)?;
                let entry = state.entries.get_mut(&entry_id)?;
                entry.available = false;
                (entry_id, entry.connection.take()?)
            };
            let mut lease = self.lease(entry_id);

            let status = probe(self.checker.as_ref(), &mut conn).await;

            let mut state = self.state.lock().await;
            if status.is_healthy() {
                if let Some(entry) = state.entries.get_mut(&entry_id) {
                    entry.last_used_at = Instant::now();
                    entry.usage_count += 1;
                    return Some(self.lend(conn, lease));
                }
                // Entry removed by a forced cleanup while probing
                lease.disarm();
                drop(state);
                self.connector.close(conn).await;
                continue;
            }

            state.entries.remove(&entry_id);
            lease.disarm();
            drop(state);
            warn!(
                "Evicting unhealthy idle {} connection {}: {}",
                self.kind(),
                entry_id,
                status
            );
            self.connector.close(conn).await;
        }
    }

    async fn try_create(&self) -> CreateOutcome<K::Connection> {
        let reservation = {
            let state = self.state.lock().await;
            let pending = self.creating.load(Ordering::Acquire);
            if state.entries.len() + pending >= self.settings.capacity {
                return CreateOutcome::AtCapacity;
            }
            self.creating.fetch_add(1, Ordering::AcqRel);
            CreateReservation(&self.creating)
        };

        let conn = match self.connector.connect().await {
            Ok(conn) => conn,
            Err(e) => return CreateOutcome::Failed(e),
        };

        let entry_id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.entries.insert(
            entry_id,
            PoolEntry {
                connection: None,
                available: false,
                created_at: now,
                last_used_at: now,
                usage_count: 1,
                health_check_count: 0,
            },
        );
        drop(reservation);
        debug!("Opened {} connection {} ({} live)", self.kind(), entry_id, state.entries.len());

        CreateOutcome::Created(self.lend(conn, self.lease(entry_id)))
    }

    fn lease(&self, entry_id: u64) -> EntryLease {
        let table: Weak<dyn EntryTable> = Arc::downgrade(&self.state) as Weak<_>;
        EntryLease::new(table, entry_id)
    }

    fn lend(&self, conn: K::Connection, lease: EntryLease) -> PooledConnection<K::Connection> {
        PooledConnection {
            pool_id: self.id,
            conn,
            lease,
        }
    }

    /// Return a lent connection to the pool.
    ///
    /// A connection this pool does not track is handed back untouched.
    pub async fn release(
        &self,
        handle: PooledConnection<K::Connection>,
    ) -> Result<(), PooledConnection<K::Connection>> {
        if handle.pool_id != self.id {
            warn!("Refusing to release a connection owned by another pool");
            return Err(handle);
        }

        let entry_id = handle.entry_id();
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&entry_id) {
            Some(entry) if !entry.available => {
                let PooledConnection {
                    conn, mut lease, ..
                } = handle;
                lease.disarm();
                entry.connection = Some(conn);
                entry.available = true;
                entry.last_used_at = Instant::now();
                Ok(())
            }
            _ => {
                warn!("Release of untracked {} connection {}", self.kind(), entry_id);
                Err(handle)
            }
        }
    }

    /// Close idle connections unused for longer than the idle timeout
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.settings.idle_timeout;

        let reaped: Vec<K::Connection> = {
            let mut state = self.state.lock().await;
            let expired: Vec<u64> = state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    entry.available && now.duration_since(entry.last_used_at) > idle_timeout
                })
                .map(|(id, _)| *id)
                .collect();

            expired
                .into_iter()
                .filter_map(|id| state.entries.remove(&id))
                .filter_map(|entry| entry.connection)
                .collect()
        };

        let count = reaped.len();
        for conn in reaped {
            self.connector.close(conn).await;
        }
        if count > 0 {
            info!("Reaped {} idle {} connections", count, self.kind());
        }
        count
    }

    /// Probe every idle entry, removing the unhealthy ones.
    ///
    /// Lent entries belong to their borrower and are only counted.
    pub async fn health_scan(&self) -> HealthReport {
        let (checked_out, in_use) = {
            let mut state = self.state.lock().await;
            let in_use = state.entries.values().filter(|e| !e.available).count();
            let mut checked_out = Vec::new();
            for (id, entry) in state.entries.iter_mut() {
                if !entry.available {
                    continue;
                }
                if let Some(conn) = entry.connection.take() {
                    entry.available = false;
                    entry.health_check_count += 1;
                    checked_out.push((*id, conn));
                }
            }
            (checked_out, in_use)
        };

        let probed = join_all(checked_out.into_iter().map(|(id, mut conn)| {
            let lease = self.lease(id);
            async move {
                let status = probe(self.checker.as_ref(), &mut conn).await;
                (id, conn, lease, status)
            }
        }))
        .await;

        let mut report = HealthReport {
            kind: self.kind(),
            healthy: 0,
            unhealthy: 0,
            in_use,
        };
        let mut to_close = Vec::new();
        {
            let mut state = self.state.lock().await;
            for (id, conn, mut lease, status) in probed {
                lease.disarm();
                if status.is_healthy() {
                    report.healthy += 1;
                    match state.entries.get_mut(&id) {
                        Some(entry) => {
                            entry.connection = Some(conn);
                            entry.available = true;
                        }
                        None => to_close.push(conn),
                    }
                } else {
                    warn!("Health scan removing {} connection {}: {}", self.kind(), id, status);
                    report.unhealthy += 1;
                    state.entries.remove(&id);
                    to_close.push(conn);
                }
            }
        }

        for conn in to_close {
            self.connector.close(conn).await;
        }
        report
    }

    /// Drop every entry and close every idle connection. Safe to repeat.
    ///
    /// Lent connections become untracked; their borrowers get them back from
    /// `release` and drop them.
    pub async fn force_cleanup(&self) -> usize {
        let (removed, idle): (usize, Vec<K::Connection>) = {
            let mut state = self.state.lock().await;
            let removed = state.entries.len();
            let idle = state
                .entries
                .drain()
                .filter_map(|(_, entry)| entry.connection)
                .collect();
            (removed, idle)
        };

        for conn in idle {
            self.connector.close(conn).await;
        }
        if removed > 0 {
            info!("Closed {} pool: removed {} entries", self.kind(), removed);
        }
        removed
    }

    /// Number of tracked entries (equal to open physical connections)
    pub async fn live_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let idle = state.entries.values().filter(|e| e.available).count();
        PoolStats {
            kind: self.kind(),
            capacity: self.settings.capacity,
            live: state.entries.len(),
            idle,
            in_use: state.entries.len() - idle,
        }
    }

    pub async fn entries(&self) -> Vec<EntryInfo> {
        let now = Instant::now();
        let state = self.state.lock().await;
        let mut entries: Vec<EntryInfo> = state
            .entries
            .iter()
            .map(|(id, entry)| EntryInfo {
                id: *id,
                available: entry.available,
                age: now.duration_since(entry.created_at),
                idle_for: now.duration_since(entry.last_used_at),
                usage_count: entry.usage_count,
                health_check_count: entry.health_check_count,
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }
}
