//! Request and response messages for both socket protocols
//!
//! Two protocols share this module: the server protocol (client → server
//! daemon on a remote host: list, bind, unbind) and the client-service
//! protocol (local tools → client service daemon: attach, detach). Requests
//! are tagged by a `command` field and responses by a `status` field, so the
//! JSON documents on the wire stay self-describing.

use crate::device::UsbDevice;
use crate::query::SearchQuery;
use serde::{Deserialize, Serialize};

/// Default TCP port of the server daemon
pub const SERVER_PORT: u16 = 5055;

/// Default TCP port of the local client service
pub const CLIENT_PORT: u16 = 5056;

/// Request to a server daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerRequest {
    /// Enumerate the devices attached to the server host
    List,
    /// Export a device through usbip so a client can attach it
    Bind { busid: String },
    /// Withdraw a previously exported device
    Unbind { busid: String },
}

/// Response from a server daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerResponse {
    /// Request handled; `data` carries the device list for `list` and is
    /// empty for `bind`/`unbind`
    Success {
        #[serde(default)]
        data: Vec<UsbDevice>,
    },
    /// Request failed; `message` is human-readable
    Error { message: String },
}

/// Request to the local client service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Resolve a device across the configured servers and attach it locally
    Attach {
        #[serde(flatten)]
        query: SearchQuery,
        /// Search only this host instead of the configured server list
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
    /// Resolve a device and detach its local port
    Detach {
        #[serde(flatten)]
        query: SearchQuery,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
}

impl ClientRequest {
    /// The search query carried by either command
    pub fn query(&self) -> &SearchQuery {
        match self {
            ClientRequest::Attach { query, .. } | ClientRequest::Detach { query, .. } => query,
        }
    }

    /// The explicit host override, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            ClientRequest::Attach { host, .. } | ClientRequest::Detach { host, .. } => {
                host.as_deref()
            }
        }
    }
}

/// Response from the local client service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientResponse {
    /// The operation completed; `local_devices` lists the device-node files
    /// discovered after an attach (possibly empty if the kernel had not
    /// materialized them yet) and is empty for detach
    Success {
        data: UsbDevice,
        server: String,
        #[serde(default)]
        local_devices: Vec<String>,
    },
    /// No device matched the query on any scanned host
    NotFound { message: String },
    /// More than one device matched and `first` was not set
    MultipleMatches { message: String },
    /// Any other failure
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_request_wire_shape() {
        // The literal field names are the protocol; decoding these documents
        // must keep working across refactors.
        let req: ServerRequest = serde_json::from_str(r#"{"command":"list"}"#).unwrap();
        assert_eq!(req, ServerRequest::List);

        let req: ServerRequest =
            serde_json::from_str(r#"{"command":"bind","busid":"1-1.1"}"#).unwrap();
        assert_eq!(
            req,
            ServerRequest::Bind {
                busid: "1-1.1".to_string()
            }
        );
    }

    #[test]
    fn test_server_response_success_without_data() {
        let resp: ServerResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(resp, ServerResponse::Success { data: Vec::new() });
    }

    #[test]
    fn test_client_request_flattens_query() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"command":"attach","id":"0bda:5411","first":true,"host":"pi4"}"#,
        )
        .unwrap();
        assert_eq!(req.host(), Some("pi4"));
        assert_eq!(req.query().id.as_deref(), Some("0bda:5411"));
        assert!(req.query().first);
    }

    #[test]
    fn test_client_request_defaults() {
        let req: ClientRequest = serde_json::from_str(r#"{"command":"detach"}"#).unwrap();
        assert!(req.query().is_empty());
        assert!(!req.query().first);
        assert_eq!(req.host(), None);
    }

    #[test]
    fn test_client_response_statuses() {
        let resp = ClientResponse::NotFound {
            message: "no matching device found across 2 server(s)".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":"not_found""#));

        let resp = ClientResponse::MultipleMatches {
            message: "ambiguous".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":"multiple_matches""#));
    }

    #[test]
    fn test_client_success_serializes_local_devices() {
        let resp = ClientResponse::Success {
            data: UsbDevice {
                busid: "1-1".to_string(),
                vendor_id: "0403".to_string(),
                product_id: "6001".to_string(),
                serial: String::new(),
                description: "FT232R".to_string(),
            },
            server: "192.168.1.10".to_string(),
            local_devices: vec!["/dev/ttyUSB0".to_string()],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""server":"192.168.1.10""#));
        assert!(json.contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_malformed_request_is_an_error_not_a_panic() {
        assert!(serde_json::from_str::<ServerRequest>(r#"{"command":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<ClientRequest>("not json").is_err());
    }
}
