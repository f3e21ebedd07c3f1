//! Device resolution across server hosts
//!
//! Fans a search query out over a list of hosts, one at a time in the
//! caller's order, and reduces the accumulated matches to exactly one device
//! or a typed error. The fan-out is deliberately sequential: with a handful
//! of hosts, reproducible first-match selection is worth more than parallel
//! latency, and the result order must never depend on a wall-clock race.

use crate::remote::RemoteServers;
use anyhow::Result;
use protocol::{SearchQuery, UsbDevice};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Source of per-host device lists
///
/// The scanner only needs "give me host X's devices"; in production that is a
/// socket request, in tests a canned table.
pub trait EnumerateDevices {
    fn enumerate(&self, host: &str) -> impl Future<Output = Result<Vec<UsbDevice>>> + Send;
}

impl EnumerateDevices for RemoteServers {
    async fn enumerate(&self, host: &str) -> Result<Vec<UsbDevice>> {
        self.list(host).await
    }
}

/// One matched device and the host it lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatch {
    pub device: UsbDevice,
    pub server: String,
}

impl fmt::Display for DeviceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.device.description, self.server)
    }
}

/// Definitive scan failures
///
/// These are the only conditions that stop an attach/detach operation; a
/// single unreachable host is handled inside the scan and never surfaces
/// here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no matching device found across {hosts_scanned} server(s)")]
    NotFound { hosts_scanned: usize },

    #[error(
        "multiple devices matched across servers: {}. Use --first to take the first match",
        format_matches(.matches)
    )]
    MultipleMatches { matches: Vec<DeviceMatch> },
}

fn format_matches(matches: &[DeviceMatch]) -> String {
    matches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a query to exactly one (device, host) pair
///
/// Hosts are scanned in the given order; every device of every reachable host
/// is tested against the query and matches accumulate in host-then-device
/// order. A host whose enumeration fails contributes zero matches and the
/// scan continues. Zero accumulated matches is `NotFound`; more than one
/// without `first` is `MultipleMatches`; with `first` the first match in scan
/// order wins, deterministically for identical inputs.
pub async fn find_device<E: EnumerateDevices>(
    query: &SearchQuery,
    hosts: &[String],
    enumerator: &E,
) -> Result<(UsbDevice, String), ScanError> {
    let mut matches: Vec<DeviceMatch> = Vec::new();

    for host in hosts {
        let devices = match enumerator.enumerate(host).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to query server {}: {:#}", host, e);
                continue;
            }
        };

        for device in devices {
            if query.matches(&device) {
                debug!("Match found on {}: {}", host, device.description);
                matches.push(DeviceMatch {
                    device,
                    server: host.clone(),
                });
            }
        }
    }

    if matches.len() > 1 && !query.first {
        return Err(ScanError::MultipleMatches { matches });
    }

    match matches.into_iter().next() {
        Some(m) => Ok((m.device, m.server)),
        None => Err(ScanError::NotFound {
            hosts_scanned: hosts.len(),
        }),
    }
}
