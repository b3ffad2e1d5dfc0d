/// MySQL relational-store connector
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RelationalConfig;
use crate::core::{BackendKind, Connector};
use crate::error::{PoolError, PoolResult};

/// Connection type handed out by the relational pool
pub type RelationalConnection = MySqlConnection;

/// Opens MySQL connections from configuration
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(config: &RelationalConfig, connect_timeout: Duration) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .charset("utf8mb4");

        Self {
            options,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = RelationalConnection;

    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn connect(&self) -> PoolResult<RelationalConnection> {
        debug!("Opening relational connection");

        match timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(PoolError::create_failed(BackendKind::Relational, e.to_string())),
            Err(_) => Err(PoolError::create_failed(
                BackendKind::Relational,
                format!("connect timed out after {:?}", self.connect_timeout),
            )),
        }
    }

    async fn close(&self, conn: RelationalConnection) {
        if let Err(e) = conn.close().await {
            warn!("Error while closing relational connection: {}", e);
        }
    }
}
