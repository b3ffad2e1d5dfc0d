/// MySQL connection health checker

use super::{HealthChecker, HealthStatus};
use crate::backends::mysql::RelationalConnection;
use sqlx::Connection;
use std::time::Duration;

/// Uses the protocol-level COM_PING round trip
pub struct MySqlHealthChecker {
    check_timeout: Duration,
}

impl MySqlHealthChecker {
    pub fn new(check_timeout: Duration) -> Self {
        Self { check_timeout }
    }
}

#[async_trait::async_trait]
impl HealthChecker<RelationalConnection> for MySqlHealthChecker {
    async fn check_health(&self, conn: &mut RelationalConnection) -> HealthStatus {
        match conn.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("Ping failed: {}", e),
            },
        }
    }

    fn check_timeout(&self) -> Duration {
        self.check_timeout
    }
}

impl Default for MySqlHealthChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
