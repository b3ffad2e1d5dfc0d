/// Core abstractions shared by the relational and cache-store pools
pub mod manager;
pub mod pool;

pub use manager::{ConnectionPoolManager, MaintenanceReport};
pub use pool::{ConnectionPool, EntryInfo, HealthReport, PoolSettings, PoolStats};

use crate::error::PoolResult;
use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

/// Which backend a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// MySQL system of record
    Relational,
    /// Redis cache store
    CacheStore,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Relational => write!(f, "relational"),
            BackendKind::CacheStore => write!(f, "cache-store"),
        }
    }
}

/// Opens and closes physical connections of one backend kind.
///
/// The pool is the only caller; business code never constructs connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn kind(&self) -> BackendKind;

    /// Open a new physical connection
    async fn connect(&self) -> PoolResult<Self::Connection>;

    /// Close a physical connection. Must not fail on an already-broken connection.
    async fn close(&self, conn: Self::Connection);
}

/// Entry table a lease can discard from without holding a reference to the pool
pub(crate) trait EntryTable: Send + Sync {
    fn discard(self: Arc<Self>, entry_id: u64);
}

/// Claim on one pool entry while its connection is outside the pool.
///
/// Dropped while armed, it removes the entry so the slot is not lost. Covers
/// handles dropped without `release` and checks abandoned by a cancelled future.
#[derive(Debug)]
pub(crate) struct EntryLease {
    table: Weak<dyn EntryTable>,
    entry_id: u64,
    armed: bool,
}

impl EntryLease {
    pub(crate) fn new(table: Weak<dyn EntryTable>, entry_id: u64) -> Self {
        Self {
            table,
            entry_id,
            armed: true,
        }
    }

    pub(crate) fn entry_id(&self) -> u64 {
        self.entry_id
    }

    /// The pool has taken the entry back (or removed it) itself
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for EntryLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            table.discard(self.entry_id);
        }
    }
}

/// A connection lent out by a pool.
///
/// Hand it back with the owning pool's `release`. Dropping it instead discards
/// the physical connection and frees its slot.
#[derive(Debug)]
pub struct PooledConnection<C> {
    pub(crate) pool_id: u64,
    pub(crate) conn: C,
    pub(crate) lease: EntryLease,
}

impl<C> PooledConnection<C> {
    /// Identifier of the pool entry holding this connection
    pub fn entry_id(&self) -> u64 {
        self.lease.entry_id()
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}
