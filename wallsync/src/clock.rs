//! Authoritative time reference for the wall and local playback scheduling.
//!
//! The clock service answers UDP time queries so nodes can align their own
//! clocks to the coordinator's. A query carries at least 8 bytes (the node's
//! own send timestamp, opaque here); the reply echoes those 8 bytes followed
//! by the coordinator's current time as a big-endian u64 of nanoseconds since
//! the Unix epoch. Base times handed out by [`ClockSource::play`] live in the
//! same domain.

use log::{debug, info, warn};
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Result, WallError};

/// Smallest lead ever granted between scheduling and the base time.
pub const MIN_BASE_TIME_LEAD: Duration = Duration::from_millis(50);

pub const CLOCK_QUERY_LEN: usize = 8;
pub const CLOCK_REPLY_LEN: usize = 16;

/// Current time in the clock service's domain.
pub fn now_nsecs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Local decode pipeline driven by the clock source.
pub trait Decoder: Send {
    /// Arm playback of `path` so it starts at `base_time_nsecs`.
    fn start(&mut self, path: &Path, base_time_nsecs: u64) -> Result<()>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    fn duration(&self) -> Option<Duration>;

    fn position(&self) -> Option<Duration>;
}

struct Scheduled {
    path: PathBuf,
    base_time_nsecs: u64,
}

/// Decoder that opens the file and then follows the clock without rendering.
///
/// Position is the time elapsed since the base time (zero while waiting for
/// it), capped at the duration when one is known.
#[derive(Default)]
pub struct ScheduledDecoder {
    duration: Option<Duration>,
    current: Option<Scheduled>,
}

impl ScheduledDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            current: None,
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        let current = self.current.as_ref()?;
        Some(Duration::from_nanos(
            now_nsecs().saturating_sub(current.base_time_nsecs),
        ))
    }
}

impl Decoder for ScheduledDecoder {
    fn start(&mut self, path: &Path, base_time_nsecs: u64) -> Result<()> {
        File::open(path)
            .map_err(|e| WallError::MediaUnavailable(format!("{}: {e}", path.display())))?;
        self.current = Some(Scheduled {
            path: path.to_path_buf(),
            base_time_nsecs,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(current) = self.current.take() {
            debug!("Stopped {}", current.path.display());
        }
    }

    fn is_playing(&self) -> bool {
        match (self.elapsed(), self.duration) {
            (Some(elapsed), Some(duration)) => elapsed < duration,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn position(&self) -> Option<Duration> {
        let elapsed = self.elapsed()?;
        Some(match self.duration {
            Some(duration) => elapsed.min(duration),
            None => elapsed,
        })
    }
}

pub struct ClockSource {
    decoder: Box<dyn Decoder>,
    base_time_nsecs: Option<u64>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    service: Option<JoinHandle<()>>,
}

impl ClockSource {
    /// Bind the clock service on `ip:port` and start answering queries.
    pub async fn bind(ip: IpAddr, port: u16, decoder: Box<dyn Decoder>) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = socket.local_addr()?;
        let cancel = CancellationToken::new();
        let service = tokio::spawn(serve_clock(socket, cancel.clone()));
        info!("Clock service listening on {local_addr}");

        Ok(Self {
            decoder,
            base_time_nsecs: None,
            local_addr,
            cancel,
            service: Some(service),
        })
    }

    /// Arm the decoder for `path` and commit the base time it will start at.
    pub fn play(&mut self, path: &Path, offset: Duration) -> Result<u64> {
        if self.service.is_none() {
            return Err(WallError::Closed);
        }
        let lead = offset.max(MIN_BASE_TIME_LEAD);
        let lead_nsecs = u64::try_from(lead.as_nanos()).unwrap_or(u64::MAX);
        let base_time = now_nsecs().saturating_add(lead_nsecs);

        self.decoder.start(path, base_time)?;
        self.base_time_nsecs = Some(base_time);
        info!("Scheduled {} at base time {base_time}", path.display());
        Ok(base_time)
    }

    pub fn get_base_time_nsecs(&self) -> Option<u64> {
        self.base_time_nsecs
    }

    pub fn is_playing(&self) -> bool {
        self.decoder.is_playing()
    }

    pub fn get_duration(&self) -> Option<Duration> {
        self.decoder.duration()
    }

    pub fn get_position(&self) -> Option<Duration> {
        self.base_time_nsecs?;
        self.decoder.position()
    }

    pub fn get_ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    pub fn get_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the decoder and the clock service. Safe to call more than once.
    pub async fn close(&mut self) {
        let Some(service) = self.service.take() else {
            return;
        };
        self.cancel.cancel();
        if let Err(e) = service.await {
            warn!("Clock service task failed: {e}");
        }
        self.decoder.stop();
        info!("Clock service on {} closed", self.local_addr);
    }
}

impl Drop for ClockSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve_clock(socket: UdpSocket, cancel: CancellationToken) {
    let mut buf = [0u8; 64];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Clock service shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, peer)) if len >= CLOCK_QUERY_LEN => {
                        let mut reply = [0u8; CLOCK_REPLY_LEN];
                        reply[..CLOCK_QUERY_LEN].copy_from_slice(&buf[..CLOCK_QUERY_LEN]);
                        reply[CLOCK_QUERY_LEN..].copy_from_slice(&now_nsecs().to_be_bytes());
                        if let Err(e) = socket.send_to(&reply, peer).await {
                            warn!("Failed to answer clock query from {peer}: {e}");
                        }
                    }
                    Ok((len, peer)) => {
                        debug!("Dropped {len}-byte clock query from {peer}");
                    }
                    Err(e) => {
                        warn!("Error receiving clock query: {e}");
                    }
                }
            }
        }
    }
}
