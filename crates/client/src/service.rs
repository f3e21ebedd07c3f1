//! Client service daemon
//!
//! Listens on a local TCP socket for attach/detach commands (one JSON
//! document per request/response) so desktop tooling and scripts can drive
//! the pipeline without shelling out to the CLI. Each connection is handled
//! in its own task; resolution failures map to their dedicated wire statuses
//! so callers can distinguish "refine your query" from "something broke".

use crate::actions::{ActionError, attach_device, detach_device};
use crate::config::ClientConfig;
use crate::scanner::ScanError;
use anyhow::{Context, Result, anyhow};
use common::ServiceState;
use protocol::{ClientRequest, ClientResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Upper bound on a single request document
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// Local daemon accepting attach/detach commands
pub struct ClientService {
    listener: TcpListener,
    config: Arc<ClientConfig>,
    state: ServiceState,
    shutdown: Notify,
}

impl ClientService {
    /// Bind the listening socket and enter the Listening state
    pub async fn bind(config: ClientConfig) -> Result<Self> {
        let bind_addr = config.client.service_bind.clone();
        let port = config.client.service_port;
        let listener = TcpListener::bind((bind_addr.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", bind_addr, port))?;

        let state = ServiceState::new();
        if !state.start() {
            return Err(anyhow!("Client service state machine refused to start"));
        }

        info!("Client service listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config: Arc::new(config),
            state,
            shutdown: Notify::new(),
        })
    }

    /// Address the service actually bound (port 0 resolves here)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until [`stop`](Self::stop) is called
    pub async fn run(&self) -> Result<()> {
        while self.state.is_listening() {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Client connected from {}", addr);
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, addr, config).await {
                                warn!("Error handling client {}: {:#}", addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept error: {}", e),
                },
            }
        }

        self.state.finish_stop();
        info!("Client service stopped");
        Ok(())
    }

    /// Request the accept loop to stop
    pub fn stop(&self) {
        if self.state.request_stop() {
            self.shutdown.notify_one();
        }
    }
}

/// Handle one connection: read a request document, run it, respond
async fn handle_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> Result<()> {
    let mut data = Vec::new();
    (&mut stream)
        .take(MAX_REQUEST_BYTES)
        .read_to_end(&mut data)
        .await
        .context("Failed to read request")?;

    let response = match serde_json::from_slice::<ClientRequest>(&data) {
        Ok(request) => {
            info!("{:?} request from {}", request, addr);
            handle_device_command(&config, &request).await
        }
        Err(e) => {
            warn!("Invalid request from {}: {}", addr, e);
            ClientResponse::Error {
                message: format!("Invalid request format: {}", e),
            }
        }
    };

    let mut body = serde_json::to_vec(&response).context("Failed to encode response")?;
    body.push(b'\n');
    stream
        .write_all(&body)
        .await
        .context("Failed to write response")?;
    stream.shutdown().await.ok();
    Ok(())
}

/// Run an attach or detach command and map the outcome to a wire response
async fn handle_device_command(config: &ClientConfig, request: &ClientRequest) -> ClientResponse {
    let result = match request {
        ClientRequest::Attach { query, host } => {
            attach_device(config, query, host.as_deref())
                .await
                .map(|outcome| ClientResponse::Success {
                    data: outcome.device,
                    server: outcome.server,
                    local_devices: outcome.local_devices,
                })
        }
        ClientRequest::Detach { query, host } => {
            detach_device(config, query, host.as_deref())
                .await
                .map(|outcome| ClientResponse::Success {
                    data: outcome.device,
                    server: outcome.server,
                    local_devices: Vec::new(),
                })
        }
    };

    result.unwrap_or_else(|e| match e {
        ActionError::Scan(scan @ ScanError::NotFound { .. }) => {
            warn!("Device not found: {}", scan);
            ClientResponse::NotFound {
                message: scan.to_string(),
            }
        }
        ActionError::Scan(scan @ ScanError::MultipleMatches { .. }) => {
            warn!("Multiple devices matched: {}", scan);
            ClientResponse::MultipleMatches {
                message: scan.to_string(),
            }
        }
        ActionError::Other(e) => {
            warn!("Device command failed: {:#}", e);
            ClientResponse::Error {
                message: format!("{:#}", e),
            }
        }
    })
}
