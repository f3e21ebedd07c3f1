//! Wire types for usb-remote
//!
//! This crate defines the types exchanged between the client and the server
//! daemons: USB device descriptors, search queries, and the request/response
//! messages for both socket protocols. The wire format is one JSON document
//! per request and per response; framing beyond that is the transport's
//! concern.

pub mod device;
pub mod error;
pub mod messages;
pub mod query;

pub use device::UsbDevice;
pub use error::{ProtocolError, Result};
pub use messages::{
    CLIENT_PORT, ClientRequest, ClientResponse, SERVER_PORT, ServerRequest, ServerResponse,
};
pub use query::SearchQuery;
