/// Redis connection health checker

use super::{HealthChecker, HealthStatus};
use crate::backends::redis::CacheStoreConnection;
use std::time::Duration;

/// Sends PING and expects +PONG on the pooled connection itself
pub struct RedisHealthChecker {
    check_timeout: Duration,
}

impl RedisHealthChecker {
    pub fn new(check_timeout: Duration) -> Self {
        Self { check_timeout }
    }
}

#[async_trait::async_trait]
impl HealthChecker<CacheStoreConnection> for RedisHealthChecker {
    async fn check_health(&self, conn: &mut CacheStoreConnection) -> HealthStatus {
        match conn.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("PING failed: {}", e),
            },
        }
    }

    fn check_timeout(&self) -> Duration {
        self.check_timeout
    }
}

impl Default for RedisHealthChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
