use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::catalog::{DirCatalog, MediaCatalog};
use crate::clock::{ClockSource, Decoder, ScheduledDecoder};
use crate::config::WallConfig;
use crate::messages::{ClientConfig, DiscoveryMessage, PlayCommandMessage};
use crate::registry::{ClientRecord, ClientRegistry};
use crate::transport::BroadcastTransport;
use crate::{Result, WallError};

/// The wall's coordinating server.
///
/// Owns the clock service, the discovery and heartbeat loops, and the play
/// command channel from [`Coordinator::start`] until [`Coordinator::close`].
pub struct Coordinator {
    catalog: Arc<dyn MediaCatalog>,
    clock: Mutex<ClockSource>,
    transport: Mutex<BroadcastTransport>,
    registry: Arc<ClientRegistry>,
    base_time_offset: Duration,
    client_config: ClientConfig,
    clock_addr: SocketAddr,
    heartbeat_addr: SocketAddr,
    closed: AtomicBool,
}

impl Coordinator {
    /// Start with a [`DirCatalog`] over `config.media_path` and a [`ScheduledDecoder`].
    pub async fn from_config(config: WallConfig) -> Result<Self> {
        let catalog = Arc::new(DirCatalog::new(config.media_path.clone()));
        Self::start(config, catalog, Box::new(ScheduledDecoder::new())).await
    }

    pub async fn start(
        config: WallConfig,
        catalog: Arc<dyn MediaCatalog>,
        decoder: Box<dyn Decoder>,
    ) -> Result<Self> {
        config.validate()?;
        let base_time_offset = config.base_time_offset()?;

        let mut clock = ClockSource::bind(config.ip, config.server_clock_port, decoder).await?;
        let registry = Arc::new(ClientRegistry::new());

        let transport = match start_transport(&config, &clock, registry.clone()).await {
            Ok(transport) => transport,
            Err(e) => {
                clock.close().await;
                return Err(e);
            }
        };

        let clock_addr = clock.local_addr();
        let heartbeat_addr = transport.heartbeat_addr();
        info!("Coordinator started (clock {clock_addr}, heartbeats {heartbeat_addr})");

        Ok(Self {
            catalog,
            clock: Mutex::new(clock),
            transport: Mutex::new(transport),
            registry,
            base_time_offset,
            client_config: config.client_config,
            clock_addr,
            heartbeat_addr,
            closed: AtomicBool::new(false),
        })
    }

    /// Schedule `filename` on every node. Returns the base time that was broadcast.
    pub async fn play(&self, filename: &str, time_overlay: bool) -> Result<u64> {
        self.ensure_open()?;
        let path = self.catalog.resolve(filename)?;

        // The clock stays locked until the command is out, so no other play
        // can replace the base time this message carries.
        let mut clock = self.clock.lock().await;
        let base_time_nsecs = clock.play(&path, self.base_time_offset)?;
        let command = PlayCommandMessage {
            filename: filename.to_string(),
            base_time_nsecs,
            time_overlay,
            client_config: self.client_config.clone(),
            clock_ip: clock.get_ip(),
            clock_port: clock.get_port(),
        };
        self.transport.lock().await.send_play(&command).await?;
        Ok(base_time_nsecs)
    }

    pub async fn is_playing(&self) -> bool {
        self.clock.lock().await.is_playing()
    }

    pub async fn get_duration(&self) -> Option<Duration> {
        self.clock.lock().await.get_duration()
    }

    pub async fn get_position(&self) -> Option<Duration> {
        self.clock.lock().await.get_position()
    }

    pub fn get_media_filenames(&self) -> Result<Vec<String>> {
        self.catalog.list_filenames()
    }

    pub async fn get_clients(&self) -> Vec<ClientRecord> {
        self.registry.snapshot().await
    }

    pub async fn sync_media(&self, remote_paths: Vec<PathBuf>) -> Result<usize> {
        self.ensure_open()?;
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || catalog.sync(&remote_paths))
            .await
            .map_err(|e| WallError::SyncError(e.to_string()))?
    }

    pub fn clock_addr(&self) -> SocketAddr {
        self.clock_addr
    }

    pub fn heartbeat_addr(&self) -> SocketAddr {
        self.heartbeat_addr
    }

    /// Stop both loops and release every socket. Returns once all of it is gone.
    pub async fn close(&self) {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        // Both halves are idempotent; a concurrent caller still waits on the locks.
        self.transport.lock().await.close().await;
        self.clock.lock().await.close().await;
        if first {
            info!("Coordinator closed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(WallError::Closed)
        } else {
            Ok(())
        }
    }
}

async fn start_transport(
    config: &WallConfig,
    clock: &ClockSource,
    registry: Arc<ClientRegistry>,
) -> Result<BroadcastTransport> {
    let period = config.broadcast_interval()?;
    let expiry = config.client_expiry()?;
    let announce = DiscoveryMessage {
        clock_ip: clock.get_ip(),
        clock_port: clock.get_port(),
    };

    let mut transport = BroadcastTransport::bind(config).await?;
    let started = transport
        .start_discovery(&announce, period)
        .and_then(|()| transport.start_heartbeat(registry, expiry));
    if let Err(e) = started {
        transport.close().await;
        return Err(e);
    }
    Ok(transport)
}
