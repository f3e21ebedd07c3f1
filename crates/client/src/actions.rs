//! Attach and detach pipelines
//!
//! Glue between resolution and the kernel: resolve the query to one (device,
//! host) pair, then drive the usbip tool and confirm what the kernel actually
//! did. Only resolution failures stop an operation; everything downstream of
//! a successful resolve degrades with a warning.

use crate::config::ClientConfig;
use crate::port::Port;
use crate::remote::RemoteServers;
use crate::scanner::{ScanError, find_device};
use anyhow::{Context, anyhow};
use common::{PollBudget, run_command};
use protocol::{SearchQuery, UsbDevice};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Pause between polls while waiting for an attached port to materialize
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Failure of an attach/detach operation
#[derive(Debug, Error)]
pub enum ActionError {
    /// Resolution failed definitively (not found / ambiguous)
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Anything else: tool invocation, local attach failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result of a completed attach
#[derive(Debug, Clone)]
pub struct AttachOutcome {
    pub device: UsbDevice,
    pub server: String,
    /// Device-node files found after materialization; empty if the kernel
    /// had not created them within the retry budget
    pub local_devices: Vec<String>,
}

/// Result of a completed detach
#[derive(Debug, Clone)]
pub struct DetachOutcome {
    pub device: UsbDevice,
    pub server: String,
    /// Local port that was detached; None if no port was found for the
    /// device (it may have been detached already)
    pub port: Option<u32>,
}

/// Resolve and attach a device, then report its local device files
pub async fn attach_device(
    config: &ClientConfig,
    query: &SearchQuery,
    host: Option<&str>,
) -> Result<AttachOutcome, ActionError> {
    let hosts = config.host_list(host);
    let servers = RemoteServers::new(config.client.server_port, config.client.connect_timeout());

    info!(
        "Searching for device to attach across {} server(s)",
        hosts.len()
    );
    let (device, server) = find_device(query, &hosts, &servers).await?;

    info!("Attaching device {} from {}", device.busid, server);

    // Make sure the device is exported; a failure usually means it already is
    if let Err(e) = servers.bind(&server, &device.busid).await {
        warn!("Remote bind of {} failed: {:#}", device.busid, e);
    }

    let output = run_command("usbip", &["attach", "-r", &server, "-b", &device.busid])
        .context("Failed to run usbip attach")?;
    if !output.success() {
        return Err(ActionError::Other(anyhow!(
            "usbip attach -r {} -b {} failed: {}",
            server,
            device.busid,
            output.stderr.trim()
        )));
    }

    // The kernel takes a moment to materialize the port and its nodes
    let budget = PollBudget::new(config.client.attach_retries, ATTACH_POLL_INTERVAL);
    let local_devices = match Port::find_by_remote(&device.busid, &server, budget).await {
        Some(port) => {
            info!(
                "Device attached on local port {} with devices: {:?}",
                port.port, port.local_devices
            );
            port.local_devices
        }
        None => {
            warn!("Local device files not found (may still be initializing)");
            Vec::new()
        }
    };

    Ok(AttachOutcome {
        device,
        server,
        local_devices,
    })
}

/// Resolve a device and detach its local port
pub async fn detach_device(
    config: &ClientConfig,
    query: &SearchQuery,
    host: Option<&str>,
) -> Result<DetachOutcome, ActionError> {
    let hosts = config.host_list(host);
    let servers = RemoteServers::new(config.client.server_port, config.client.connect_timeout());

    info!(
        "Searching for device to detach across {} server(s)",
        hosts.len()
    );
    let (device, server) = find_device(query, &hosts, &servers).await?;

    info!("Detaching device {} from {}", device.busid, server);

    let port = Port::find_by_remote(&device.busid, &server, PollBudget::once()).await;
    match &port {
        Some(port) => port.detach(),
        None => warn!(
            "No local port found for {} from {} (already detached?)",
            device.busid, server
        ),
    }

    // Withdraw the export so the device returns to the server host
    if let Err(e) = servers.unbind(&server, &device.busid).await {
        warn!("Remote unbind of {} failed: {:#}", device.busid, e);
    }

    Ok(DetachOutcome {
        device,
        server,
        port: port.map(|p| p.port),
    })
}
