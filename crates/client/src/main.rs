//! usb-remote Client
//!
//! Command-line client for attaching USB devices shared by usb-remote
//! servers. Resolves a search query across the configured server hosts,
//! drives the kernel's USB/IP subsystem through the `usbip` tool, and
//! reports which local device files the attached device ended up with.

mod actions;
mod config;
mod devfiles;
mod port;
mod remote;
mod scanner;
mod service;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use common::setup_logging;
use port::Port;
use protocol::SearchQuery;
use remote::RemoteServers;
use service::ClientService;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-remote")]
#[command(
    author,
    version,
    about = "usb-remote client - attach remote USB devices to this machine"
)]
#[command(long_about = "
Attach USB devices shared by usb-remote servers as if they were plugged in
locally. Devices are matched by id, busid, serial or description across all
configured servers.

EXAMPLES:
    # List devices on all configured servers
    usb-remote list

    # Attach a device by vendor:product id
    usb-remote attach --id 0403:6001

    # Attach whichever serial adapter is found first
    usb-remote attach --desc 'USB UART' --first

    # Detach it again
    usb-remote detach --id 0403:6001

    # Show local ports in use with their device files
    usb-remote ports

CONFIGURATION:
    The client looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-remote/client.toml
    3. /etc/usb-remote/client.toml
    4. Built-in defaults
")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the devices available on the configured servers
    List {
        /// Query a single server instead of the configured list
        #[arg(short = 'H', long)]
        host: Option<String>,
    },
    /// Attach a remote USB device to this machine
    Attach {
        #[command(flatten)]
        selector: DeviceSelector,
    },
    /// Detach a previously attached device
    Detach {
        #[command(flatten)]
        selector: DeviceSelector,
    },
    /// Show the local ports currently in use
    Ports,
    /// Run the client service daemon
    Service,
}

/// Search criteria shared by attach and detach
#[derive(ClapArgs, Debug)]
struct DeviceSelector {
    /// Device ID, e.g. 0403:6001
    #[arg(short = 'd', long)]
    id: Option<String>,

    /// Device serial number
    #[arg(short, long)]
    serial: Option<String>,

    /// Device description substring
    #[arg(long)]
    desc: Option<String>,

    /// Device busid on the server, e.g. 1-2.3
    #[arg(short, long)]
    bus: Option<String>,

    /// Take the first match if multiple devices match
    #[arg(short, long)]
    first: bool,

    /// Server hostname or IP (overrides configured servers)
    #[arg(short = 'H', long)]
    host: Option<String>,
}

impl DeviceSelector {
    fn query(&self) -> SearchQuery {
        SearchQuery {
            id: self.id.clone(),
            bus: self.bus.clone(),
            serial: self.serial.clone(),
            desc: self.desc.clone(),
            first: self.first,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --save-config flag early (before loading config)
    if cli.save_config {
        let config = config::ClientConfig::default();
        let path = config::ClientConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = cli.config {
        config::ClientConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::ClientConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.client.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    match cli.command {
        Some(Command::List { host }) => list_command(&config, host.as_deref()).await,
        Some(Command::Attach { selector }) => attach_command(&config, &selector).await,
        Some(Command::Detach { selector }) => detach_command(&config, &selector).await,
        Some(Command::Ports) => ports_command(),
        Some(Command::Service) => service_command(config).await,
        None => {
            // No subcommand: behave like `list` over the configured servers
            list_command(&config, None).await
        }
    }
}

/// Query every server in turn and print its devices
async fn list_command(config: &config::ClientConfig, host: Option<&str>) -> Result<()> {
    let hosts = config.host_list(host);
    let servers = RemoteServers::new(config.client.server_port, config.client.connect_timeout());

    for server in &hosts {
        println!("\n=== {} ===", server);
        match servers.list(server).await {
            Ok(devices) if devices.is_empty() => println!("No devices"),
            Ok(devices) => {
                for device in devices {
                    println!("{}", device);
                }
            }
            Err(e) => {
                info!("Failed to query server {}: {:#}", server, e);
                println!("No devices or server unavailable");
            }
        }
    }
    Ok(())
}

async fn attach_command(config: &config::ClientConfig, selector: &DeviceSelector) -> Result<()> {
    let outcome =
        actions::attach_device(config, &selector.query(), selector.host.as_deref()).await?;

    println!("Attached to device on {}:\n{}", outcome.server, outcome.device);
    if outcome.local_devices.is_empty() {
        println!("Local device files not found yet (may still be initializing)");
    } else {
        println!("Local devices: {}", outcome.local_devices.join(", "));
    }
    Ok(())
}

async fn detach_command(config: &config::ClientConfig, selector: &DeviceSelector) -> Result<()> {
    let outcome =
        actions::detach_device(config, &selector.query(), selector.host.as_deref()).await?;

    println!("Detached from device on {}:\n{}", outcome.server, outcome.device);
    if let Some(port) = outcome.port {
        println!("Freed local port {}", port);
    }
    Ok(())
}

/// Print the local port table
fn ports_command() -> Result<()> {
    let ports = Port::list();
    if ports.is_empty() {
        println!("No ports in use");
    } else {
        for port in ports {
            println!("{}", port);
        }
    }
    Ok(())
}

/// Run the client service daemon until Ctrl+C
async fn service_command(config: config::ClientConfig) -> Result<()> {
    let service = Arc::new(
        ClientService::bind(config)
            .await
            .context("Failed to start client service")?,
    );

    info!("Press Ctrl+C to shutdown");

    let runner = service.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!("Client service error: {:#}", e);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    service.stop();
    handle.await.ok();

    info!("Client service shutdown complete");
    Ok(())
}
