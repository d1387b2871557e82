//! Zenoh telemetry agent for the BME280 environmental sensor.
//!
//! Samples temperature and humidity on a fixed cadence and publishes the
//! readings to a remote Zenoh endpoint, dropping messages on transient
//! connectivity failures and shutting down cleanly on Ctrl+C.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use zenoh_bridge_bme280::channel::PublishChannel;
use zenoh_bridge_bme280::config::{AgentArgs, AgentConfig};
use zenoh_bridge_bme280::publish::PublishLoop;
use zenoh_bridge_bme280::sensor::{self, SensorSource, SimulatedSensor};
use zenoh_bridge_bme280::status::{AGENT_NAME, AgentStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments and resolve configuration; a missing endpoint
    // while sending is enabled fails here, before anything else runs.
    let args = AgentArgs::parse();
    let config = AgentConfig::resolve(&args)?;

    enviropub_common::init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;

    let version = env!("CARGO_PKG_VERSION");
    tracing::info!(agent = AGENT_NAME, version, "Starting agent");

    let device_id = config.bme280.get_device_id();

    // Sensor detection runs before any connection or loop iteration.
    // Failure is fatal; there is no fallback to simulated data.
    let sensor: Box<dyn SensorSource> = if config.bme280.simulated {
        tracing::info!("Using simulated sensor data");
        Box::new(SimulatedSensor::new())
    } else {
        let sensor = sensor::detect(&config.bme280.i2c)?;
        tracing::info!(
            bus = %config.bme280.i2c.bus,
            address = %format_args!("0x{:02x}", config.bme280.i2c.address),
            "Found BME280 sensor"
        );
        sensor
    };

    let sink = if config.bme280.no_send {
        tracing::info!("Send disabled, printing telemetry to console only");
        None
    } else {
        let channel = PublishChannel::connect(
            &config.zenoh,
            &config.bme280.key_prefix,
            &device_id,
            config.serialization,
        )
        .await?;

        tracing::info!(key = %channel.key(), "Publishing telemetry");

        let running = AgentStatus::running(AGENT_NAME, version).with_metadata(serde_json::json!({
            "device_id": device_id,
            "interval_ms": config.bme280.interval_ms,
            "simulated": config.bme280.simulated,
        }));
        if let Err(e) = channel.publish_status(&running).await {
            tracing::warn!(error = %e, "Failed to publish running status");
        }

        Some(channel)
    };

    // Ctrl+C fires the cancellation token; the loop finishes the cycle
    // in flight and moves to shutdown.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received shutdown signal");
        signal_cancel.cancel();
    });

    tracing::info!(
        device = %device_id,
        interval_ms = config.bme280.interval_ms,
        "Agent running. Press Ctrl+C to stop."
    );

    let publish_loop = PublishLoop::new(
        sensor,
        sink,
        device_id,
        Duration::from_millis(config.bme280.interval_ms),
        cancel,
    );

    let stats = publish_loop.run().await?;

    tracing::info!(
        cycles = stats.cycles,
        accepted = stats.accepted,
        dropped = stats.dropped,
        "Goodbye!"
    );

    Ok(())
}
