//! IoT Registry Demo
//!
//! Starts the registry, registers a handful of simulated sensors, and prints
//! the aggregate readings of every group as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use iot::{DeviceRef, IotConfig, IotSystem, RegistryClient};

/// IoT device registry
#[derive(Parser, Debug)]
#[command(name = "iot")]
#[command(about = "In-process IoT device registry demo", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of device groups to create
    #[arg(long, default_value = "2")]
    groups: usize,

    /// Number of devices per group
    #[arg(long, default_value = "3")]
    devices: usize,

    /// Deadline for aggregate reads, overrides the configured one
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Keep recording and collecting until Ctrl+C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => IotConfig::load(path).await?,
        None => IotConfig::default(),
    }
    .apply_env();

    init_tracing(&config);
    info!("Starting IoT registry v{}", env!("CARGO_PKG_VERSION"));

    let deadline = args
        .deadline_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.query_timeout());

    let system = IotSystem::start(&config).await?;
    let client = system.client().clone();

    let group_ids: Vec<String> = (1..=args.groups).map(|g| format!("floor-{g}")).collect();
    let mut devices = register_devices(&client, &group_ids, args.devices).await?;

    // The last sensor of every group stays silent and reports no reading
    for (_, _, device) in devices.iter().filter(|(_, index, _)| index + 1 < args.devices) {
        client.record_value(device, random_temperature()).await?;
    }

    if let Some((group_id, _, device)) = devices.first() {
        info!(group_id = %group_id, device = ?device.id(), "Retiring one sensor");
        client.retire_device(device).await?;
        device.wait_for_shutdown().await;
        devices.remove(0);
    }

    print_readings(&client, &group_ids, deadline).await?;

    if args.watch {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for (_, _, device) in &devices {
                        if let Err(e) = client.record_value(device, random_temperature()).await {
                            warn!(device = ?device.id(), "Failed to record value: {}", e);
                        }
                    }
                    print_readings(&client, &group_ids, deadline).await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    break;
                }
            }
        }
    }

    system.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &IotConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let json = config.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let plain = (!config.log_json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

/// Register `per_group` sensors in every group
async fn register_devices(
    client: &RegistryClient,
    group_ids: &[String],
    per_group: usize,
) -> Result<Vec<(String, usize, DeviceRef)>> {
    let mut devices = Vec::new();
    for group_id in group_ids {
        for index in 0..per_group {
            let device = client
                .track_device(group_id, &format!("sensor-{index}"))
                .await?;
            devices.push((group_id.clone(), index, device));
        }
    }

    let groups = client.list_groups().await?;
    info!(groups = groups.len(), devices = devices.len(), "Sensors registered");
    Ok(devices)
}

async fn print_readings(
    client: &RegistryClient,
    group_ids: &[String],
    deadline: Duration,
) -> Result<()> {
    for group_id in group_ids {
        let readings = client.collect_readings_within(group_id, deadline).await?;
        let report = serde_json::json!({
            "group_id": group_id,
            "readings": readings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn random_temperature() -> f64 {
    let value: f64 = rand::thread_rng().gen_range(15.0..30.0);
    (value * 10.0).round() / 10.0
}
