//! Requests the CLI sends to a running daemon over its Unix socket.
//!
//! One JSON request per connection; the client shuts down its write half and
//! reads a single JSON response back.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wallsync::{ClientRecord, Coordinator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    Ping,
    Play { filename: String, time_overlay: bool },
    Status,
    Files,
    Clients,
    Sync { remote_paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum ControlResponse {
    Pong,
    Scheduled {
        filename: String,
        base_time_nsecs: u64,
    },
    Status {
        playing: bool,
        duration_secs: Option<f64>,
        position_secs: Option<f64>,
    },
    Files {
        filenames: Vec<String>,
    },
    Clients {
        clients: Vec<ClientRecord>,
    },
    Synced {
        copied: usize,
    },
    Error {
        message: String,
    },
}

pub async fn handle_request(coordinator: &Coordinator, request: ControlRequest) -> ControlResponse {
    let outcome = match request {
        ControlRequest::Ping => Ok(ControlResponse::Pong),
        ControlRequest::Play {
            filename,
            time_overlay,
        } => coordinator
            .play(&filename, time_overlay)
            .await
            .map(|base_time_nsecs| ControlResponse::Scheduled {
                filename,
                base_time_nsecs,
            }),
        ControlRequest::Status => Ok(ControlResponse::Status {
            playing: coordinator.is_playing().await,
            duration_secs: coordinator.get_duration().await.map(|d| d.as_secs_f64()),
            position_secs: coordinator.get_position().await.map(|d| d.as_secs_f64()),
        }),
        ControlRequest::Files => coordinator
            .get_media_filenames()
            .map(|filenames| ControlResponse::Files { filenames }),
        ControlRequest::Clients => Ok(ControlResponse::Clients {
            clients: coordinator.get_clients().await,
        }),
        ControlRequest::Sync { remote_paths } => coordinator
            .sync_media(remote_paths)
            .await
            .map(|copied| ControlResponse::Synced { copied }),
    };

    outcome.unwrap_or_else(|e| ControlResponse::Error {
        message: e.to_string(),
    })
}

/// Answer a single request arriving on `stream`.
pub async fn serve_connection<S>(mut stream: S, coordinator: &Coordinator) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .context("Failed to read control request")?;

    let response = match serde_json::from_slice::<ControlRequest>(&raw) {
        Ok(request) => {
            debug!("Control request: {request:?}");
            handle_request(coordinator, request).await
        }
        Err(e) => {
            warn!("Malformed control request: {e}");
            ControlResponse::Error {
                message: format!("malformed request: {e}"),
            }
        }
    };

    stream.write_all(&serde_json::to_vec(&response)?).await?;
    stream.shutdown().await?;
    Ok(())
}
