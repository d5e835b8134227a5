//! SensorHouse CLI (sensorctl)
//!
//! Command-line tool for operating a SensorHouse store directly.
//!
//! ## Overview
//!
//! `sensorctl` opens the store in-process and exposes the facade operations:
//! - **Tenants**: create, list and delete (administrative, no tenant needed)
//! - **Sensors**: create and list within a tenant
//! - **Readings**: insert, scan a time range, aggregate a trailing window
//! - **Load & stats**: inject synthetic bursts, read cached tenant statistics
//! - **Administration**: list partitions, seed fixture data
//!
//! ## Quick Start
//!
//! ```bash
//! export SENSORHOUSE_STORE=./sensorhouse.db
//!
//! sensorctl tenant create "Acme Corp"
//! export SENSORHOUSE_TENANT=<id printed above>
//!
//! sensorctl sensor create boiler --type temperature
//! sensorctl load --amount 1000
//! sensorctl stats
//! sensorctl aggregate --window-secs 300 --function avg
//! ```
//!
//! ## Configuration
//!
//! - `SENSORHOUSE_STORE`: SQLite file, or `:memory:` for a throwaway store
//! - `SENSORHOUSE_TENANT`: Tenant identifier for tenant-scoped commands
//! - `SENSORHOUSE_CONFIG`: Optional JSON file with storage settings
//! - `RUST_LOG`: Log level (default: info); logs go to stderr
//!
//! Command results are printed to stdout as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use sensorhouse_metadata::{
    CreateSensor, InMemorySensorStore, Reading, SensorStatus, SensorStore, SqliteSensorStore,
    TimeRange,
};
use sensorhouse_storage::{AggregateFn, SeedPlan, SensorHouse, StorageConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

const MEMORY_STORE: &str = ":memory:";

#[derive(Parser)]
#[command(name = "sensorctl")]
#[command(about = "SensorHouse command-line tool", long_about = None, version)]
struct Cli {
    /// SQLite database file (":memory:" for a throwaway store)
    #[arg(long, env = "SENSORHOUSE_STORE", default_value = "sensorhouse.db")]
    store: String,

    /// Tenant identifier for tenant-scoped commands
    #[arg(short, long, env = "SENSORHOUSE_TENANT")]
    tenant: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "SENSORHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long)]
    emit_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tenant management commands
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Sensor management commands
    Sensor {
        #[command(subcommand)]
        command: SensorCommands,
    },
    /// Insert a single reading
    Insert {
        /// Sensor id
        #[arg(short, long)]
        sensor: Uuid,
        /// Reading value
        #[arg(short, long)]
        value: f64,
        /// Timestamp (RFC 3339, default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Inject a burst of synthetic readings
    Load {
        /// Number of readings
        #[arg(short, long, default_value = "1000")]
        amount: usize,
    },
    /// Show write rate, read latency and row count
    Stats,
    /// Stream readings in a time range
    Scan {
        /// Range start (RFC 3339)
        #[arg(long, conflicts_with = "last_secs")]
        from: Option<DateTime<Utc>>,
        /// Range end (RFC 3339, default: now)
        #[arg(long, conflicts_with = "last_secs")]
        to: Option<DateTime<Utc>>,
        /// Scan the trailing N seconds instead of an explicit range
        #[arg(long)]
        last_secs: Option<u64>,
        /// Stop after this many readings
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Aggregate readings over a trailing window
    Aggregate {
        /// Window length in seconds
        #[arg(short, long, default_value = "60")]
        window_secs: u64,
        /// count, avg, sum, min or max
        #[arg(short, long, default_value = "avg")]
        function: AggregateFn,
    },
    /// List materialized partitions
    Partitions,
    /// Populate the store with fixture tenants, sensors and readings
    Seed {
        #[arg(long, default_value = "2")]
        tenants: usize,
        #[arg(long, default_value = "5")]
        sensors_per_tenant: usize,
        #[arg(long, default_value = "10000")]
        readings_per_sensor: usize,
        #[arg(long, default_value = "500")]
        batch_size: usize,
    },
}

#[derive(Subcommand)]
enum TenantCommands {
    /// Create a new tenant
    Create {
        /// Tenant name
        name: String,
        /// Plan type
        #[arg(short, long)]
        plan: Option<String>,
    },
    /// List all tenants
    List,
    /// Delete a tenant and everything it owns
    Delete {
        /// Tenant id
        id: String,
    },
}

#[derive(Subcommand)]
enum SensorCommands {
    /// Create a sensor for the current tenant
    Create {
        /// Sensor name
        name: String,
        /// Sensor type (default: temperature)
        #[arg(short = 'T', long = "type")]
        sensor_type: Option<String>,
        /// Create the sensor as inactive
        #[arg(long)]
        inactive: bool,
    },
    /// List the current tenant's sensors
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = match &cli.config {
        Some(path) => StorageConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StorageConfig::default(),
    };

    let store = open_store(&cli.store).await?;
    let house = SensorHouse::open(store, config)
        .await
        .context("Failed to open SensorHouse")?;

    let tenant = cli.tenant.as_deref();
    match cli.command {
        Commands::Tenant { command } => handle_tenant_command(&house, command).await?,
        Commands::Sensor { command } => handle_sensor_command(&house, tenant, command).await?,
        Commands::Insert { sensor, value, at } => {
            let id = house
                .insert(tenant, sensor, value, at.unwrap_or_else(Utc::now))
                .await
                .context("Failed to insert reading")?;
            print_json(&serde_json::json!({ "id": id }))?;
        }
        Commands::Load { amount } => {
            let report = house
                .start_load(tenant, amount)
                .await
                .context("Failed to inject load")?;
            print_json(&report)?;
        }
        Commands::Stats => {
            let stats = house.get_stats(tenant).await.context("Failed to get stats")?;
            print_json(&stats)?;
        }
        Commands::Scan {
            from,
            to,
            last_secs,
            limit,
        } => handle_scan(&house, tenant, from, to, last_secs, limit).await?,
        Commands::Aggregate {
            window_secs,
            function,
        } => {
            let value = house
                .aggregate(tenant, Duration::from_secs(window_secs), function)
                .await
                .context("Failed to aggregate readings")?;
            print_json(&serde_json::json!({
                "function": function.as_str(),
                "windowSecs": window_secs,
                "value": value,
            }))?;
        }
        Commands::Partitions => {
            let partitions = house
                .partitions()
                .await
                .context("Failed to list partitions")?;
            let names: Vec<String> = partitions.iter().map(|p| p.table_name()).collect();
            print_json(&names)?;
        }
        Commands::Seed {
            tenants,
            sensors_per_tenant,
            readings_per_sensor,
            batch_size,
        } => {
            let plan = SeedPlan {
                tenants,
                sensors_per_tenant,
                readings_per_sensor,
                batch_size,
                ..house.config().seed.clone()
            };
            let report = house.seed(&plan).await.context("Failed to seed store")?;
            print_json(&report)?;
        }
    }

    if cli.emit_metrics {
        let metrics = sensorhouse_observability::exporter::render()
            .context("Failed to render metrics")?;
        eprintln!("{}", metrics);
    }

    Ok(())
}

async fn open_store(location: &str) -> Result<Arc<dyn SensorStore>> {
    if location == MEMORY_STORE {
        tracing::debug!("Using in-memory store");
        return Ok(Arc::new(InMemorySensorStore::new()));
    }

    tracing::debug!(path = location, "Using SQLite store");
    let store = SqliteSensorStore::new(location)
        .await
        .with_context(|| format!("Failed to open SQLite store at {}", location))?;
    Ok(Arc::new(store))
}

/// Handles tenant administration.
///
/// These commands run outside any tenant scope; `delete` takes the tenant id
/// as an argument instead of `--tenant`.
async fn handle_tenant_command(house: &SensorHouse, command: TenantCommands) -> Result<()> {
    match command {
        TenantCommands::Create { name, plan } => {
            let tenant = house
                .create_tenant(&name, plan)
                .await
                .context("Failed to create tenant")?;
            print_json(&tenant)?;
        }
        TenantCommands::List => {
            let tenants = house.list_tenants().await.context("Failed to list tenants")?;
            print_json(&tenants)?;
        }
        TenantCommands::Delete { id } => {
            house
                .delete_tenant(&id)
                .await
                .with_context(|| format!("Failed to delete tenant {}", id))?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
    }

    Ok(())
}

async fn handle_sensor_command(
    house: &SensorHouse,
    tenant: Option<&str>,
    command: SensorCommands,
) -> Result<()> {
    match command {
        SensorCommands::Create {
            name,
            sensor_type,
            inactive,
        } => {
            let request = CreateSensor {
                name,
                sensor_type,
                status: if inactive {
                    SensorStatus::Inactive
                } else {
                    SensorStatus::Active
                },
            };
            let sensor = house
                .create_sensor(tenant, request)
                .await
                .context("Failed to create sensor")?;
            print_json(&sensor)?;
        }
        SensorCommands::List => {
            let sensors = house
                .list_sensors(tenant)
                .await
                .context("Failed to list sensors")?;
            print_json(&sensors)?;
        }
    }

    Ok(())
}

async fn handle_scan(
    house: &SensorHouse,
    tenant: Option<&str>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    last_secs: Option<u64>,
    limit: Option<usize>,
) -> Result<()> {
    let now = Utc::now();
    let (from, to) = match last_secs {
        Some(secs) => {
            let window = TimeRange::trailing(now, Duration::from_secs(secs))
                .context("Invalid --last-secs window")?;
            (window.from(), window.to())
        }
        None => (
            from.context("Either --from or --last-secs is required")?,
            to.unwrap_or(now),
        ),
    };

    let stream = house
        .scan(tenant, from, to)
        .context("Failed to start scan")?;
    let readings: Vec<Reading> = stream
        .take(limit.unwrap_or(usize::MAX))
        .try_collect()
        .await
        .context("Scan failed")?;

    print_json(&readings)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", rendered);
    Ok(())
}
