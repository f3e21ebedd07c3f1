//! Local USB device enumeration from sysfs
//!
//! The kernel exposes every attached USB device as a directory under
//! `/sys/bus/usb/devices` named by its busid (`1-1`, `1-1.4`, ...). Interface
//! directories (`1-1:1.0`) and root hubs (`usb1`) live in the same listing
//! and are skipped; attribute files under each device directory carry the
//! descriptor strings.

use anyhow::{Context, Result};
use protocol::UsbDevice;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sysfs USB device directory
const USB_DEVICES_PATH: &str = "/sys/bus/usb/devices";

/// USB hub device class code
const CLASS_HUB: &str = "09";

/// Enumerates USB devices from a sysfs device directory
///
/// The root is injectable so tests can point it at a synthetic tree.
#[derive(Debug, Clone)]
pub struct DeviceEnumerator {
    root: PathBuf,
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self {
            root: PathBuf::from(USB_DEVICES_PATH),
        }
    }
}

impl DeviceEnumerator {
    /// Enumerator over a specific sysfs root (tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// List the USB devices attached to this host, sorted by busid
    ///
    /// Hubs are excluded: they cannot usefully be attached remotely and would
    /// drown the listing on hosts with deep hub trees. A missing or unreadable
    /// sysfs root is an error; a single unreadable device entry is skipped.
    pub fn list(&self) -> Result<Vec<UsbDevice>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?;

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_busid(&name) {
                continue;
            }
            match self.read_device(&entry.path(), &name) {
                Some(device) => devices.push(device),
                None => debug!("Skipping sysfs entry {}", name),
            }
        }

        devices.sort_by(|a, b| a.busid.cmp(&b.busid));
        Ok(devices)
    }

    /// Read one device directory; None for hubs and unreadable entries
    fn read_device(&self, path: &Path, busid: &str) -> Option<UsbDevice> {
        let vendor_id = read_attribute(path, "idVendor")?;
        let product_id = read_attribute(path, "idProduct")?;

        if read_attribute(path, "bDeviceClass").as_deref() == Some(CLASS_HUB) {
            return None;
        }

        let manufacturer = read_attribute(path, "manufacturer").unwrap_or_default();
        let product = read_attribute(path, "product").unwrap_or_default();
        let description = [manufacturer.as_str(), product.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");

        Some(UsbDevice {
            busid: busid.to_string(),
            vendor_id,
            product_id,
            serial: read_attribute(path, "serial").unwrap_or_default(),
            description,
        })
    }
}

/// Read and trim a sysfs attribute file; None if absent or unreadable
fn read_attribute(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

/// True for busid-shaped directory names such as "1-1" or "2-1.4.3"
///
/// Interface directories carry a ":" suffix and root hubs are named "usbN";
/// neither is a device entry.
fn is_busid(name: &str) -> bool {
    let Some((bus, path)) = name.split_once('-') else {
        return false;
    };
    !bus.is_empty()
        && bus.chars().all(|c| c.is_ascii_digit())
        && !path.is_empty()
        && path.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !path.starts_with('.')
        && !path.ends_with('.')
}
