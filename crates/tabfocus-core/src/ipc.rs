//! Local control socket: lets the CLI send UI requests to a running host.
//!
//! One request per connection. The client writes a JSON request object,
//! shuts down its write half and reads a JSON response until EOF.

use anyhow::{Context, Result};
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

use crate::protocol::{Request, Response};
use crate::service::FocusService;

/// Largest request a client may send
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request and wait for the host's answer.
    ///
    /// # Errors
    ///
    /// Returns an error if no host is listening or the exchange fails
    pub async fn send_command(&self, request: &Request) -> Result<Value> {
        let mut stream = UnixStream::connect(&self.sock_path)
            .await
            .with_context(|| format!("No host listening on {}", self.sock_path.display()))?;

        let encoded = serde_json::to_vec(request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: Value =
            serde_json::from_slice(&buffer).context("Host sent a malformed response")?;

        Ok(response)
    }
}

async fn handle_connection(service: &FocusService, stream: &mut UnixStream) -> Result<()> {
    let mut buffer = Vec::new();
    (&mut *stream)
        .take(MAX_REQUEST_BYTES)
        .read_to_end(&mut buffer)
        .await?;
    if buffer.is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_slice::<Value>(&buffer) {
        Ok(value) => service.handle_value(value).await,
        Err(e) => Response::failure(format!("malformed request: {e}")),
    };

    let encoded = serde_json::to_vec(&response)?;
    stream.write_all(&encoded).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Serve requests on `sock_path` until the task is dropped. A stale socket
/// file is replaced.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound
pub async fn listen(service: Arc<FocusService>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    if let Some(parent) = sock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(sock_path)?;
    log::info!("Listening for control requests on {}", sock_path.display());

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(&service, &mut stream).await {
                        log::error!("IPC handle error: {e:#}");
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}
