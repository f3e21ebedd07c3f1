//! Device search queries and match evaluation

use crate::device::UsbDevice;
use serde::{Deserialize, Serialize};

/// Search criteria for selecting a device across one or more hosts
///
/// All supplied fields must match (AND semantics); a field left `None` is a
/// wildcard. A query with every field empty matches every device — this is
/// intentional and is how "list everything" is expressed, not an accident of
/// the implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// `vendor:product` identifier, e.g. "0bda:5411"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Exact busid on the remote host, e.g. "1-1.1"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    /// Exact serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Case-sensitive substring of the device description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Take the first match in scan order instead of failing on ambiguity
    #[serde(default)]
    pub first: bool,
}

impl SearchQuery {
    /// Evaluate this query against a device descriptor
    ///
    /// Pure function: `id`, `bus` and `serial` compare exactly, `desc` is a
    /// case-sensitive substring test, absent fields always pass.
    pub fn matches(&self, device: &UsbDevice) -> bool {
        if let Some(id) = &self.id {
            if *id != device.id() {
                return false;
            }
        }
        if let Some(bus) = &self.bus {
            if *bus != device.busid {
                return false;
            }
        }
        if let Some(serial) = &self.serial {
            if *serial != device.serial {
                return false;
            }
        }
        if let Some(desc) = &self.desc {
            if !device.description.contains(desc.as_str()) {
                return false;
            }
        }
        true
    }

    /// True if no search field is set (the query matches everything)
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.bus.is_none() && self.serial.is_none() && self.desc.is_none()
    }
}
