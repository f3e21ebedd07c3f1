//! USB device descriptor

use serde::{Deserialize, Serialize};
use std::fmt;

/// A USB device as enumerated on a server host
///
/// Immutable value produced by the server's sysfs enumeration and consumed
/// read-only by matching on the client side. The originating host is not part
/// of the descriptor; a device list response is always scoped to the host
/// that produced it, and the scanner carries the host alongside the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    /// Position on the server's USB bus, e.g. "1-1.1"
    pub busid: String,
    /// USB Vendor ID as a 4-hex-digit string, e.g. "0bda"
    pub vendor_id: String,
    /// USB Product ID as a 4-hex-digit string, e.g. "5411"
    pub product_id: String,
    /// Serial number string (empty if the device reports none)
    #[serde(default)]
    pub serial: String,
    /// Human description (manufacturer and product)
    #[serde(default)]
    pub description: String,
}

impl UsbDevice {
    /// The `vendor:product` identifier used by `--id` queries
    pub fn id(&self) -> String {
        format!("{}:{}", self.vendor_id, self.product_id)
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.busid, self.description, self.id())?;
        if !self.serial.is_empty() {
            write!(f, " serial={}", self.serial)?;
        }
        Ok(())
    }
}
