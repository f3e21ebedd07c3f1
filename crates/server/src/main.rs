//! usb-remote Server
//!
//! USB device sharing server that runs on the host whose devices are to be
//! shared. Enumerates attached USB devices from sysfs and answers
//! list/bind/unbind requests over a TCP socket, one JSON document per
//! request/response; the actual device transport is the kernel's USB/IP
//! subsystem driven through the `usbip` tool.

mod config;
mod devices;
mod export;
mod server;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use devices::DeviceEnumerator;
use server::CommandServer;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-remote-server")]
#[command(
    author,
    version,
    about = "usb-remote server - share this host's USB devices over the network"
)]
#[command(long_about = "
Shares the USB devices of this host with usb-remote clients. Devices are
enumerated from sysfs and exported through the kernel's USB/IP subsystem.

EXAMPLES:
    # Run with default config
    usb-remote-server

    # Run with custom config
    usb-remote-server --config /path/to/server.toml

    # List USB devices without starting the server
    usb-remote-server --list-devices

    # Install as a user systemd service
    usb-remote-server --install-service

CONFIGURATION:
    The server looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-remote/server.toml
    3. /etc/usb-remote/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Install the server as a systemd service and exit
    #[arg(long)]
    install_service: bool,

    /// Remove the installed systemd service and exit
    #[arg(long)]
    uninstall_service: bool,

    /// Use system scope for --install-service/--uninstall-service (requires root)
    #[arg(long)]
    system: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::ServerConfig::default();
        let path = config::ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        config::ServerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::ServerConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-remote server v{}", env!("CARGO_PKG_VERSION"));

    if args.install_service {
        return service::install_service(args.system);
    }
    if args.uninstall_service {
        return service::uninstall_service(args.system);
    }

    let enumerator = DeviceEnumerator::default();

    if args.list_devices {
        return list_devices_mode(&enumerator);
    }

    run_server(config, enumerator).await
}

/// List USB devices and exit
fn list_devices_mode(enumerator: &DeviceEnumerator) -> Result<()> {
    let devices = enumerator.list().context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!("  {}", device);
        }
    }

    Ok(())
}

/// Run the command server until Ctrl+C
async fn run_server(config: config::ServerConfig, enumerator: DeviceEnumerator) -> Result<()> {
    if service::is_systemd() {
        info!("Running under systemd");
    }

    let server = Arc::new(
        CommandServer::bind(&config.server.bind_addr, config.server.port, enumerator)
            .await
            .context("Failed to start command server")?,
    );

    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status("Running - waiting for requests")
        .context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");

    let runner = server.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!("Server error: {:#}", e);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    service::notify_stopping().context("Failed to notify systemd stopping")?;

    server.stop();
    server_handle.await.ok();

    info!("Server shutdown complete");
    Ok(())
}
