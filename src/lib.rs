/// conduct-store - connection pooling and cache-aside access for the conduct
/// score record service
///
/// Every business operation reaches its backends through one
/// `ConnectionPoolManager`, built once at process start and shared behind an
/// `Arc`:
/// 1. Relational pool: MySQL connections for the system of record. Errors
///    propagate to the caller.
/// 2. Cache-store pool: Redis connections bound to a logical namespace. The
///    cache is an optimization only, so `CacheAsideAccessor` turns every cache
///    failure into a miss or a no-op.
pub mod backends;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod health;
pub mod utils;

pub use crate::cache::{CacheAsideAccessor, CacheKeyStrategy, CacheLookup, CacheType, CacheWrite};
pub use crate::config::Config;
pub use crate::core::{
    BackendKind, ConnectionPool, ConnectionPoolManager, Connector, MaintenanceReport,
    PooledConnection,
};
pub use crate::error::{PoolError, PoolResult};
