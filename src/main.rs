use anyhow::Context;
use clap::{Parser, Subcommand};
use conduct_store::config::Config;
use conduct_store::core::EntryInfo;
use conduct_store::utils::{format_duration, redact};
use conduct_store::{CacheAsideAccessor, ConnectionPoolManager, MaintenanceReport, PoolError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sqlx::Connection;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conduct-store")]
#[command(about = "Connection pool and cache-aside layer for the conduct score record service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the pools and run scheduled maintenance until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one maintenance pass and print the report
    Maintain {
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Flush the general cache namespace
    Flush {
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(config).await?,
        Commands::Config { output } => generate_config(output)?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Maintain { config } => maintain(config).await?,
        Commands::Flush { config } => flush(config).await?,
        Commands::Version => show_version(),
    }

    Ok(())
}

fn load_manager(config_path: &Path) -> anyhow::Result<Arc<ConnectionPoolManager>> {
    let config = Config::load_from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!("Configuration loaded from: {:?}", config_path);

    Ok(Arc::new(ConnectionPoolManager::new(config)))
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let manager = load_manager(&config_path)?;
    let interval = Duration::from_secs(manager.config().maintenance.interval_sec);

    info!(
        "Starting conduct-store v{}, maintenance every {}",
        env!("CARGO_PKG_VERSION"),
        format_duration(interval)
    );

    let scheduled = Arc::clone(&manager);
    let maintenance = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            scheduled.perform_maintenance().await;
        }
    });

    shutdown_signal().await;
    maintenance.abort();
    manager.shutdown().await;

    Ok(())
}

/// Completes on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  conduct-store run --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    let config = match Config::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            eprintln!("  {}", e);
            return Err(e.into());
        }
    };

    let relational = &config.database.relational;
    let cache_store = &config.database.cache_store;
    println!("✓ Configuration file is valid");
    println!(
        "  Relational store: {}@{}:{}/{} (password {})",
        relational.user,
        relational.host,
        relational.port,
        relational.database,
        redact(Some(relational.password.as_str()))
    );
    println!(
        "  Cache store: {}:{} (password {})",
        cache_store.host,
        cache_store.port,
        redact(cache_store.password.as_deref())
    );
    for (name, index) in &cache_store.databases {
        println!("    {} -> db {}", name, index);
    }
    println!(
        "  Pool capacity: {} relational, {} cache-store",
        config.pool.relational_capacity, config.pool.cache_store_capacity
    );
    println!(
        "  Idle timeout: {}",
        format_duration(config.pool.idle_timeout())
    );

    Ok(())
}

async fn maintain(config_path: PathBuf) -> anyhow::Result<()> {
    let manager = load_manager(&config_path)?;

    // Open one connection per pool so the scan has something to probe
    match manager.get_relational_connection().await {
        Ok(mut conn) => {
            if let Err(e) = conn.ping().await {
                print_failure("Relational store", &PoolError::from(e));
            }
            let _ = manager.release_relational_connection(conn).await;
        }
        Err(e) => print_failure("Relational store", &e),
    }
    let cache_name = manager.config().cache.logical_name.clone();
    match manager.get_cache_store_connection(&cache_name).await {
        Ok(Some(conn)) => {
            let _ = manager.release_cache_store_connection(conn).await;
        }
        Ok(None) => println!("Cache namespace '{}' unavailable", cache_name),
        Err(e) => print_failure("Cache store", &e),
    }

    let report = manager.perform_maintenance().await;
    print_report(&report);
    print_entries("relational", &manager.relational_pool().entries().await);
    print_entries("cache-store", &manager.cache_store_pool().entries().await);

    manager.shutdown().await;
    Ok(())
}

async fn flush(config_path: PathBuf) -> anyhow::Result<()> {
    let manager = load_manager(&config_path)?;
    let accessor = CacheAsideAccessor::new(Arc::clone(&manager));

    let flushed = accessor.invalidate_all().await;
    manager.shutdown().await;

    if flushed {
        println!("✓ Cache namespace flushed");
        Ok(())
    } else {
        anyhow::bail!("cache store unavailable, nothing flushed")
    }
}

fn print_failure(label: &str, error: &PoolError) {
    println!(
        "{} unreachable [{:?}, {}]: {}",
        label,
        error.severity(),
        if error.is_recoverable() { "retryable" } else { "permanent" },
        error
    );
}

fn print_report(report: &MaintenanceReport) {
    for health in [&report.relational, &report.cache_store] {
        println!(
            "{}: {} healthy, {} unhealthy, {} in use",
            health.kind, health.healthy, health.unhealthy, health.in_use
        );
    }
    println!(
        "Reaped idle: {} relational, {} cache-store",
        report.reaped_relational, report.reaped_cache_store
    );
}

fn print_entries(label: &str, entries: &[EntryInfo]) {
    for entry in entries {
        println!(
            "  {} #{}: {} age {} idle {} uses {} checks {}",
            label,
            entry.id,
            if entry.available { "idle" } else { "lent" },
            format_duration(entry.age),
            format_duration(entry.idle_for),
            entry.usage_count,
            entry.health_check_count
        );
    }
}

fn show_version() {
    println!("conduct-store v{}", env!("CARGO_PKG_VERSION"));
    println!("Connection pool and cache-aside layer for the conduct score record service");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Bounded MySQL and Redis pools with health checks and idle reaping");
    println!("  • Logical cache namespaces mapped to Redis databases");
    println!("  • Versioned cache-aside keys with flush-on-write invalidation");
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
