//! Unix socket ingestion: one JSON `Details` document per connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use crate::media::Details;
use crate::store::JobStore;

/// Largest submission accepted on a single connection
pub const MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;

pub struct IngestServer {
    socket_path: PathBuf,
    listener: UnixListener,
    store: Arc<JobStore>,
}

impl IngestServer {
    /// Bind the listening socket, replacing a stale one left by a previous run
    pub fn bind(socket_path: impl Into<PathBuf>, store: Arc<JobStore>) -> Result<Self> {
        let socket_path = socket_path.into();

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
        }

        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!("ingest: removed stale socket {}", socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))
            }
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to listen on socket: {}", socket_path.display()))?;

        Ok(Self {
            socket_path,
            listener,
            store,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept submissions until cancelled, then close the listener and remove the socket file
    pub async fn run(self, cancel: CancellationToken) {
        info!("ingest: listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("ingest: stop requested, closing listener");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let store = self.store.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, store).await {
                                error!("ingest: dropping submission: {:#}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("ingest: error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("ingest: failed to remove socket {}: {}", self.socket_path.display(), e);
        }
    }
}

async fn handle_connection(stream: UnixStream, store: Arc<JobStore>) -> Result<()> {
    let mut payload = Vec::new();
    stream
        .take(MAX_PAYLOAD_BYTES + 1)
        .read_to_end(&mut payload)
        .await
        .context("Failed to read submission")?;

    if payload.len() as u64 > MAX_PAYLOAD_BYTES {
        anyhow::bail!("submission larger than {} bytes", MAX_PAYLOAD_BYTES);
    }

    let details: Details = serde_json::from_slice(&payload).context("Failed to parse submission")?;
    debug!("ingest: received {} from {}", details.title, details.path);

    let id = store.enqueue(details).await.context("Failed to enqueue submission")?;
    info!("ingest: queued job {}", id);
    Ok(())
}

/// Send one recording to a running daemon
pub async fn submit(socket_path: &Path, details: &Details) -> Result<()> {
    let payload = serde_json::to_vec(details).context("Failed to encode submission")?;

    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
    stream.write_all(&payload).await.context("Failed to send submission")?;
    stream.shutdown().await.context("Failed to close connection")?;
    Ok(())
}
