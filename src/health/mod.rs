/// Health checking for pooled MySQL and Redis connections
pub mod mysql;
pub mod redis;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

/// Health status of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
    Timeout,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy { reason } => write!(f, "Unhealthy: {}", reason),
            HealthStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

impl HealthStatus {
    /// Check if the status represents a serviceable connection
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Liveness probe for one connection type.
///
/// Implementations issue a single cheap round trip and report the outcome.
/// They never touch pool state.
#[async_trait]
pub trait HealthChecker<C>: Send + Sync {
    /// Probe a live connection
    async fn check_health(&self, conn: &mut C) -> HealthStatus;

    /// Get the timeout for health checks
    fn check_timeout(&self) -> Duration;
}

/// Run a checker's probe bounded by its timeout
pub async fn probe<C: Send>(checker: &dyn HealthChecker<C>, conn: &mut C) -> HealthStatus {
    match timeout(checker.check_timeout(), checker.check_health(conn)).await {
        Ok(status) => status,
        Err(_) => HealthStatus::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHealthChecker {
        should_pass: bool,
        delay: Duration,
    }

    #[async_trait]
    impl HealthChecker<u32> for MockHealthChecker {
        async fn check_health(&self, conn: &mut u32) -> HealthStatus {
            *conn += 1;
            tokio::time::sleep(self.delay).await;
            if self.should_pass {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy {
                    reason: "Mock failure".to_string(),
                }
            }
        }

        fn check_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "Healthy");
        assert_eq!(
            HealthStatus::Unhealthy { reason: "test".to_string() }.to_string(),
            "Unhealthy: test"
        );
        assert_eq!(HealthStatus::Timeout.to_string(), "Timeout");
    }

    #[test]
    fn test_health_status_is_healthy() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Unhealthy { reason: "test".to_string() }.is_healthy());
        assert!(!HealthStatus::Timeout.is_healthy());
    }

    #[tokio::test]
    async fn test_probe_success() {
        let checker = MockHealthChecker { should_pass: true, delay: Duration::ZERO };
        let mut conn = 0u32;

        assert!(probe(&checker, &mut conn).await.is_healthy());
        assert_eq!(conn, 1);
    }

    #[tokio::test]
    async fn test_probe_failure() {
        let checker = MockHealthChecker { should_pass: false, delay: Duration::ZERO };
        let mut conn = 0u32;

        let status = probe(&checker, &mut conn).await;
        assert!(matches!(status, HealthStatus::Unhealthy { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_hung_backend_times_out() {
        let checker = MockHealthChecker { should_pass: true, delay: Duration::from_secs(60) };
        let mut conn = 0u32;

        assert_eq!(probe(&checker, &mut conn).await, HealthStatus::Timeout);
    }
}
