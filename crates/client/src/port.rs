//! Local vhci port table
//!
//! `usbip port` is the only way to ask which remote devices are currently
//! attached to this machine, and it only speaks free text whose layout has
//! drifted between tool versions. The parser here is deliberately narrow and
//! forgiving: it pulls out the two-digit port number, the description line
//! that follows, and the `usbip://host:port/busid` reference further down,
//! and skips anything it cannot recognize. A failing command means "no ports
//! known" (the vhci_hcd module may simply not be loaded), never a hard error.

use crate::devfiles::{DeviceFileResolver, NodeNameResolver};
use common::{PollBudget, poll_until, run_command};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info};

/// One port block of `usbip port` output: a line with the 2-digit port
/// number, the description on the next line, and the endpoint reference on a
/// later line. Content after the busid (speed notes, bus/dev echo lines) is
/// tolerated and ignored.
static PORT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[pP]ort *(?P<port>\d\d)[\s\S]*?\n *(?P<description>.*)\n[\s\S]*?usbip://(?P<server>[^:\s]*):\d*/(?P<busid>[0-9.\-]+)",
    )
    .expect("port table pattern must compile")
});

/// Parsed fields of one port block, before device-file discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub port: u32,
    pub description: String,
    pub server: String,
    pub busid: String,
}

/// Extract every recognizable port block from `usbip port` output
///
/// Zero blocks is a normal result for an empty table; unrecognizable text
/// contributes nothing. This function is the entire surface touching the
/// tool's text format.
pub fn parse_port_output(text: &str) -> Vec<PortRecord> {
    PORT_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let port = caps.name("port")?.as_str().parse().ok()?;
            Some(PortRecord {
                port,
                description: caps.name("description")?.as_str().trim().to_string(),
                server: caps.name("server")?.as_str().to_string(),
                busid: caps.name("busid")?.as_str().to_string(),
            })
        })
        .collect()
}

/// A local vhci port with an attached remote device
///
/// Constructed fresh on every query of the port table and immutable after
/// construction. Port numbers are unique within one query, and a (remote
/// busid, server) pair identifies at most one port at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Local port number
    pub port: u32,
    /// Server host the device is attached from
    pub server: String,
    /// Device description as printed by the tool
    pub description: String,
    /// busid of the device on the remote host
    pub remote_busid: String,
    /// Device-node files backing this port locally, sorted
    pub local_devices: Vec<String>,
}

impl Port {
    /// List the local ports currently in use
    ///
    /// Degrades to an empty list if the command cannot run, exits non-zero,
    /// or produces nothing parseable.
    pub fn list() -> Vec<Port> {
        let output = match run_command("usbip", &["port"]) {
            Ok(output) => output,
            Err(e) => {
                debug!("Error listing ports: {}", e);
                return Vec::new();
            }
        };
        if !output.success() {
            debug!("usbip port command failed: {}", output.stderr.trim());
            return Vec::new();
        }

        let ports = Self::from_output(&output.stdout, &DeviceFileResolver::new());
        debug!("Found {} active usbip ports", ports.len());
        ports
    }

    /// Build ports from captured output, discovering device files per port
    pub fn from_output<R: NodeNameResolver>(
        text: &str,
        resolver: &DeviceFileResolver<R>,
    ) -> Vec<Port> {
        parse_port_output(text)
            .into_iter()
            .map(|record| Port {
                local_devices: resolver
                    .find_device_files(record.port)
                    .into_iter()
                    .collect(),
                port: record.port,
                server: record.server,
                description: record.description,
                remote_busid: record.busid,
            })
            .collect()
    }

    /// Wait for the port of a just-attached device to materialize
    ///
    /// Polls the live port table under the given budget. `None` means the
    /// port never showed up - a soft outcome, not an error: the attach may
    /// have succeeded anyway and the caller reports unknown device files.
    pub async fn find_by_remote(remote_busid: &str, server: &str, budget: PollBudget) -> Option<Port> {
        Self::wait_for_port(remote_busid, server, budget, Port::list).await
    }

    /// [`find_by_remote`](Self::find_by_remote) with an injectable lister
    pub async fn wait_for_port<F>(
        remote_busid: &str,
        server: &str,
        budget: PollBudget,
        mut list: F,
    ) -> Option<Port>
    where
        F: FnMut() -> Vec<Port>,
    {
        let found = poll_until(budget, || {
            list()
                .into_iter()
                .find(|p| p.remote_busid == remote_busid && p.server == server)
        })
        .await;

        match &found {
            Some(port) => info!("Device attached on local port {}", port.port),
            None => debug!(
                "Port for {} on {} did not appear within {} attempt(s)",
                remote_busid, server, budget.attempts
            ),
        }
        found
    }

    /// Detach this port from the local system
    ///
    /// Failure is ignored: the port may already be gone.
    pub fn detach(&self) {
        let port = self.port.to_string();
        match run_command("usbip", &["detach", "-p", &port]) {
            Ok(output) if !output.success() => {
                debug!("usbip detach -p {} failed: {}", port, output.stderr.trim());
            }
            Err(e) => debug!("usbip detach -p {} failed: {}", port, e),
            _ => {}
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- Port {}:\n  {}\n  busid: {} from {}\n  local devices: {}",
            self.port,
            self.description,
            self.remote_busid,
            self.server,
            if self.local_devices.is_empty() {
                "none".to_string()
            } else {
                self.local_devices.join(", ")
            }
        )
    }
}
