/// Configuration management for conduct-store
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::error::ConfigError;

/// Main configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints and credentials
    pub database: DatabaseConfig,
    /// Pool sizing and timing
    #[serde(default)]
    pub pool: PoolConfig,
    /// Cache-aside key layout
    #[serde(default)]
    pub cache: CacheConfig,
    /// Maintenance schedule
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `database` section: both backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub relational: RelationalConfig,
    pub cache_store: CacheStoreConfig,
}

/// MySQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStoreConfig {
    pub host: String,
    pub port: u16,
    /// AUTH password, if the server requires one
    pub password: Option<String>,
    /// Logical cache-store name to database index
    pub databases: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live relational connections
    pub relational_capacity: usize,
    /// Maximum live cache-store connections
    pub cache_store_capacity: usize,
    /// Deadline for `acquire` when the pool is at capacity
    pub max_wait_ms: u64,
    /// Sleep between capacity re-checks while waiting
    pub retry_interval_ms: u64,
    /// Idle connections older than this are reaped
    pub idle_timeout_sec: u64,
    /// Connect timeout for new physical connections
    pub connect_timeout_sec: u64,
    /// Upper bound on a single health probe
    pub health_check_timeout_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Logical cache-store name used for cache-aside entries and flushes
    pub logical_name: String,
    /// Namespace prefix for physical keys
    pub key_prefix: String,
    /// Bump to orphan every previously written key
    pub key_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between scheduled maintenance runs in seconds
    pub interval_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            relational_capacity: 25,
            cache_store_capacity: 10,
            max_wait_ms: 5000,
            retry_interval_ms: 100,
            idle_timeout_sec: 1800,
            connect_timeout_sec: 5,
            health_check_timeout_sec: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            logical_name: "cache".to_string(),
            key_prefix: "conduct".to_string(),
            key_version: 1,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_sec: 300 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut databases = BTreeMap::new();
        databases.insert("session".to_string(), 0);
        databases.insert("cache".to_string(), 1);
        databases.insert("login-security".to_string(), 2);

        Self {
            database: DatabaseConfig {
                relational: RelationalConfig {
                    host: "127.0.0.1".to_string(),
                    port: 3306,
                    user: "conduct".to_string(),
                    password: String::new(),
                    database: "conduct".to_string(),
                },
                cache_store: CacheStoreConfig {
                    host: "127.0.0.1".to_string(),
                    port: 6379,
                    password: None,
                    databases,
                },
            },
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            maintenance: MaintenanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_sec)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_sec)
    }
}

impl CacheStoreConfig {
    /// Resolve a logical cache-store name to its database index
    pub fn resolve(&self, logical_name: &str) -> Option<u32> {
        self.databases.get(logical_name).copied()
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let relational = &self.database.relational;
        if relational.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.relational.host cannot be empty".to_string(),
            ));
        }
        if relational.database.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.relational.database cannot be empty".to_string(),
            ));
        }

        let cache_store = &self.database.cache_store;
        if cache_store.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.cache_store.host cannot be empty".to_string(),
            ));
        }
        if cache_store.databases.keys().any(|name| name.is_empty()) {
            return Err(ConfigError::ValidationError(
                "logical cache-store names cannot be empty".to_string(),
            ));
        }
        if cache_store.resolve(&self.cache.logical_name).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "cache.logical_name '{}' is not mapped in database.cache_store.databases",
                self.cache.logical_name
            )));
        }

        if self.pool.relational_capacity == 0 || self.pool.cache_store_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pool capacities must be greater than 0".to_string(),
            ));
        }

        if self.pool.retry_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pool.retry_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.pool.retry_interval_ms > self.pool.max_wait_ms {
            return Err(ConfigError::ValidationError(
                "pool.retry_interval_ms must not exceed pool.max_wait_ms".to_string(),
            ));
        }

        if self.pool.connect_timeout_sec == 0 || self.pool.health_check_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "connect and health check timeouts must be greater than 0".to_string(),
            ));
        }

        if self.cache.key_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.key_prefix cannot be empty".to_string(),
            ));
        }

        if self.maintenance.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "maintenance.interval_sec must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let mut config = Config::default();
        config.database.relational.host = "10.0.1.10".to_string();
        config.database.relational.password = "change-me".to_string();
        config.database.cache_store.host = "10.0.1.20".to_string();
        config.database.cache_store.password = Some("change-me".to_string());

        config.save_to_file(path)
    }
}
