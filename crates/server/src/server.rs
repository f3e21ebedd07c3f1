//! TCP command server
//!
//! Accepts client connections and answers list/bind/unbind requests, one JSON
//! document per request and per response. The client writes its request and
//! half-closes; the server replies and closes. Each connection is handled in
//! its own task; a malformed or failing request produces an error response,
//! never a dead connection without an answer.

use crate::devices::DeviceEnumerator;
use crate::export::{bind_device, unbind_device};
use anyhow::{Context, Result, anyhow};
use common::ServiceState;
use protocol::{ServerRequest, ServerResponse};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Upper bound on a single request document
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// Command server answering device list and export requests
pub struct CommandServer {
    listener: TcpListener,
    enumerator: DeviceEnumerator,
    state: ServiceState,
    shutdown: Notify,
}

impl CommandServer {
    /// Bind the listening socket and enter the Listening state
    pub async fn bind(bind_addr: &str, port: u16, enumerator: DeviceEnumerator) -> Result<Self> {
        let listener = TcpListener::bind((bind_addr, port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", bind_addr, port))?;

        let state = ServiceState::new();
        if !state.start() {
            return Err(anyhow!("Command server state machine refused to start"));
        }

        info!("Command server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            enumerator,
            state,
            shutdown: Notify::new(),
        })
    }

    /// Address the server actually bound (port 0 resolves here)
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
                        let enumerator = self.enumerator.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, addr, enumerator).await {
                                warn!("Error handling client {}: {:#}", addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept error: {}", e),
                },
            }
        }

        self.state.finish_stop();
        info!("Command server stopped");
        Ok(())
    }

    /// Request the accept loop to stop
    pub fn stop(&self) {
        if self.state.request_stop() {
            self.shutdown.notify_one();
        }
    }
}

/// Handle one connection: read a request document, dispatch, respond
async fn handle_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    enumerator: DeviceEnumerator,
) -> Result<()> {
    let mut data = Vec::new();
    (&mut stream)
        .take(MAX_REQUEST_BYTES)
        .read_to_end(&mut data)
        .await
        .context("Failed to read request")?;

    let response = match serde_json::from_slice::<ServerRequest>(&data) {
        Ok(request) => {
            info!("{:?} request from {}", request, addr);
            dispatch(&request, &enumerator)
        }
        Err(e) => {
            warn!("Invalid request from {}: {}", addr, e);
            ServerResponse::Error {
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

fn dispatch(request: &ServerRequest, enumerator: &DeviceEnumerator) -> ServerResponse {
    let result = match request {
        ServerRequest::List => enumerator.list().map(|data| ServerResponse::Success { data }),
        ServerRequest::Bind { busid } => {
            bind_device(busid).map(|_| ServerResponse::Success { data: Vec::new() })
        }
        ServerRequest::Unbind { busid } => {
            unbind_device(busid).map(|_| ServerResponse::Success { data: Vec::new() })
        }
    };

    result.unwrap_or_else(|e| ServerResponse::Error {
        message: format!("{:#}", e),
    })
}
