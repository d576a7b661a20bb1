//! ctaphid-relayd
//!
//! Local bridge daemon for CTAPHID authentication devices. Listens on a
//! secured local endpoint, answers enumeration queries, and relays raw HID
//! reports between callers and hardware security keys.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use relayd::config::RelayConfig;
use relayd::hid::{DeviceBackend, HidBackend};
use relayd::network::{Dispatcher, TransportListener};
use relayd::service;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ctaphid-relayd")]
#[command(
    author,
    version,
    about = "Local bridge daemon for CTAPHID authentication devices"
)]
#[command(long_about = "
Bridges local callers to CTAPHID-class devices (hardware security keys).
Clients connect to the local endpoint, enumerate matching devices, and
open raw bridging sessions against a device path.

EXAMPLES:
    # Run in the foreground with default config
    ctaphid-relayd

    # Run as a systemd service (headless)
    ctaphid-relayd --service

    # Listen on loopback TCP for debugging clients
    ctaphid-relayd --debug-transport

    # List matching devices without starting the daemon
    ctaphid-relayd --list-devices

CONFIGURATION:
    Configuration files are looked up in the following order:
    1. Path specified with --config
    2. ~/.config/ctaphid-relay/relayd.toml
    3. /etc/ctaphid-relay/relayd.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run headless under a service manager
    #[arg(long)]
    service: bool,

    /// Listen on loopback TCP instead of the local socket
    #[arg(long)]
    debug_transport: bool,

    /// List matching devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = RelayConfig::default();
        let path = RelayConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        RelayConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        RelayConfig::load_or_default()
    };
    if args.debug_transport {
        config.transport.debug = true;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("ctaphid-relayd v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(HidBackend::new().context("Failed to initialize HID subsystem")?);

    if args.list_devices {
        return list_devices_mode(backend).await;
    }

    let service_mode = args.service || config.server.service_mode;
    if service_mode {
        info!("running in service mode (headless)");
        if service::is_systemd() {
            info!("running under systemd");
        }
    }

    run(config, backend).await
}

/// List matching devices and exit.
async fn list_devices_mode(backend: Arc<HidBackend>) -> Result<()> {
    let devices = tokio::task::spawn_blocking(move || backend.enumerate())
        .await
        .context("Enumeration task failed")?
        .context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No CTAPHID devices found.");
        return Ok(());
    }

    println!("Found {} CTAPHID device(s):\n", devices.len());
    for device in devices {
        println!(
            "  {:04x}:{:04x} - {} {}",
            device.vendor_id,
            device.product_id,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product")
        );
        println!("      Path: {}", device.path);
        println!();
    }

    Ok(())
}

/// Open the endpoint, run the dispatcher, and shut down on Ctrl+C with the
/// acknowledged handshake: the endpoint is fully released before exit.
async fn run(config: RelayConfig, backend: Arc<HidBackend>) -> Result<()> {
    let listener = TransportListener::open(&config.transport)
        .await
        .context("Failed to open listening endpoint")?;

    let (dispatcher, shutdown) = Dispatcher::new(listener, backend);
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let watchdog_handle = service::spawn_watchdog_task();
    service::notify_ready().context("Failed to notify service manager ready")?;
    service::notify_status("Running - waiting for connections")
        .context("Failed to send status to service manager")?;

    info!("press Ctrl+C to shut down");
    match signal::ctrl_c().await {
        Ok(()) => info!("received stop request, shutting down"),
        Err(e) => error!("error waiting for Ctrl+C: {e}"),
    }

    service::notify_stopping().context("Failed to notify service manager stopping")?;
    watchdog_handle.abort();

    // Blocks until the accept loop has observed the request and released
    // the endpoint. In-flight sessions are not cancelled; they end with
    // their connections or devices (or with the process).
    shutdown.shutdown().await;
    let _ = dispatcher_handle.await;

    info!("shutdown complete");
    Ok(())
}
