//! Requests to server daemons
//!
//! Each request is a short-lived TCP connection carrying one JSON document in
//! each direction: connect, write the request, half-close, read the response
//! to EOF. Connect and read are both bounded by the configured per-host
//! timeout so one dead server cannot stall a scan for long.

use anyhow::{Context, Result, anyhow};
use protocol::{ProtocolError, ServerRequest, ServerResponse, UsbDevice};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Upper bound on a single response document
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Client side of the server protocol
#[derive(Debug, Clone)]
pub struct RemoteServers {
    port: u16,
    request_timeout: Duration,
}

impl RemoteServers {
    pub fn new(port: u16, request_timeout: Duration) -> Self {
        Self {
            port,
            request_timeout,
        }
    }

    /// Enumerate the devices a server host offers
    pub async fn list(&self, host: &str) -> Result<Vec<UsbDevice>> {
        match self.exchange(host, &ServerRequest::List).await? {
            ServerResponse::Success { data } => {
                debug!("Server {}: {} devices", host, data.len());
                Ok(data)
            }
            ServerResponse::Error { message } => Err(ProtocolError::Peer(message).into()),
        }
    }

    /// Ask a server to export a device for attachment
    pub async fn bind(&self, host: &str, busid: &str) -> Result<()> {
        self.expect_success(
            host,
            &ServerRequest::Bind {
                busid: busid.to_string(),
            },
        )
        .await
    }

    /// Ask a server to withdraw an exported device
    pub async fn unbind(&self, host: &str, busid: &str) -> Result<()> {
        self.expect_success(
            host,
            &ServerRequest::Unbind {
                busid: busid.to_string(),
            },
        )
        .await
    }

    async fn expect_success(&self, host: &str, request: &ServerRequest) -> Result<()> {
        match self.exchange(host, request).await? {
            ServerResponse::Success { .. } => Ok(()),
            ServerResponse::Error { message } => Err(ProtocolError::Peer(message).into()),
        }
    }

    /// One request/response round trip against a single host
    async fn exchange(&self, host: &str, request: &ServerRequest) -> Result<ServerResponse> {
        debug!("Connecting to server at {}:{}", host, self.port);

        let mut stream = timeout(self.request_timeout, TcpStream::connect((host, self.port)))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}:{}", host, self.port))?
            .with_context(|| format!("Failed to connect to {}:{}", host, self.port))?;

        let body = serde_json::to_vec(request).context("Failed to encode request")?;
        stream
            .write_all(&body)
            .await
            .context("Failed to send request")?;
        // Half-close so the server sees EOF and answers
        stream
            .shutdown()
            .await
            .context("Failed to close write side")?;

        let mut data = Vec::new();
        timeout(
            self.request_timeout,
            (&mut stream).take(MAX_RESPONSE_BYTES).read_to_end(&mut data),
        )
        .await
        .map_err(|_| anyhow!("Timed out waiting for response from {}", host))?
        .context("Failed to read response")?;

        serde_json::from_slice(&data)
            .map_err(ProtocolError::Serialization)
            .with_context(|| format!("Malformed response from {}", host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn spawn_stub(response: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            stream.read_to_end(&mut request).await.unwrap();
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_list_parses_device_data() {
        let addr = spawn_stub(
            r#"{"status":"success","data":[{"busid":"1-1","vendor_id":"0403","product_id":"6001"}]}"#,
        )
        .await;

        let servers = RemoteServers::new(addr.port(), Duration::from_secs(2));
        let devices = servers.list("127.0.0.1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].busid, "1-1");
    }

    #[tokio::test]
    async fn test_error_status_becomes_an_error() {
        let addr = spawn_stub(r#"{"status":"error","message":"nope"}"#).await;

        let servers = RemoteServers::new(addr.port(), Duration::from_secs(2));
        let err = servers.bind("127.0.0.1", "1-1").await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        // Port 1 on localhost is essentially never listening
        let servers = RemoteServers::new(1, Duration::from_millis(500));
        assert!(servers.list("127.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_response_is_an_error() {
        let addr = spawn_stub("garbage").await;

        let servers = RemoteServers::new(addr.port(), Duration::from_secs(2));
        let err = servers.list("127.0.0.1").await.unwrap_err();
        assert!(err.to_string().contains("Malformed response"));
    }
}
