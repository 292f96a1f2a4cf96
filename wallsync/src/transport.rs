use log::{debug, info, trace, warn};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WallConfig;
use crate::messages::{self, DiscoveryMessage, HeartbeatMessage, PlayCommandMessage};
use crate::registry::ClientRegistry;
use crate::{Result, WallError};

/// Upper bound on a single heartbeat receive before the loop goes around again.
pub const HEARTBEAT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

const MAX_DATAGRAM: usize = 65_507;

/// UDP broadcast channels of the coordinator: discovery out, play commands out,
/// heartbeats in. Every channel has its own socket.
pub struct BroadcastTransport {
    discovery_socket: Option<UdpSocket>,
    heartbeat_socket: Option<UdpSocket>,
    play_socket: Option<UdpSocket>,
    discovery_target: SocketAddr,
    play_target: SocketAddr,
    heartbeat_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl BroadcastTransport {
    pub async fn bind(config: &WallConfig) -> Result<Self> {
        let send_addr = SocketAddr::new(config.ip, 0);

        let discovery_socket = UdpSocket::bind(send_addr).await?;
        discovery_socket.set_broadcast(true)?;

        let play_socket = UdpSocket::bind(send_addr).await?;
        play_socket.set_broadcast(true)?;

        // Broadcasts only reach sockets bound to the wildcard address.
        let any = match config.ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let heartbeat_socket =
            UdpSocket::bind(SocketAddr::new(any, config.client_broadcast_port)).await?;
        let heartbeat_addr = heartbeat_socket.local_addr()?;

        Ok(Self {
            discovery_socket: Some(discovery_socket),
            heartbeat_socket: Some(heartbeat_socket),
            play_socket: Some(play_socket),
            discovery_target: SocketAddr::new(config.broadcast_addr, config.server_broadcast_port),
            play_target: SocketAddr::new(
                config.broadcast_addr,
                config.server_play_broadcast_port,
            ),
            heartbeat_addr,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn heartbeat_addr(&self) -> SocketAddr {
        self.heartbeat_addr
    }

    /// Start announcing `announce` every `period` until the transport is closed.
    pub fn start_discovery(&mut self, announce: &DiscoveryMessage, period: Duration) -> Result<()> {
        let socket = self.discovery_socket.take().ok_or(WallError::Closed)?;
        let payload = messages::encode(announce)?;
        let target = self.discovery_target;
        info!(
            "Announcing clock at {}:{} to {target} every {period:?}",
            announce.clock_ip, announce.clock_port
        );

        let task = tokio::spawn(run_discovery(socket, target, payload, period, self.cancel.clone()));
        self.tasks.push(("discovery", task));
        Ok(())
    }

    /// Start feeding received heartbeats into `registry`.
    pub fn start_heartbeat(
        &mut self,
        registry: Arc<ClientRegistry>,
        expiry: Option<Duration>,
    ) -> Result<()> {
        let socket = self.heartbeat_socket.take().ok_or(WallError::Closed)?;
        info!("Listening for heartbeats on {}", self.heartbeat_addr);

        let task = tokio::spawn(run_heartbeat(socket, registry, expiry, self.cancel.clone()));
        self.tasks.push(("heartbeat", task));
        Ok(())
    }

    pub async fn send_play(&self, command: &PlayCommandMessage) -> Result<()> {
        let socket = self.play_socket.as_ref().ok_or(WallError::Closed)?;
        let payload = messages::encode(command)?;
        socket.send_to(&payload, self.play_target).await?;
        info!(
            "Play command for {} (base time {}) sent to {}",
            command.filename, command.base_time_nsecs, self.play_target
        );
        Ok(())
    }

    /// Stop both loops, wait for them to exit, and release every socket.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        for (name, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("{name} loop ended abnormally: {e}");
            }
        }
        self.discovery_socket = None;
        self.heartbeat_socket = None;
        self.play_socket = None;
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_discovery(
    socket: UdpSocket,
    target: SocketAddr,
    payload: Vec<u8>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Discovery loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                match socket.send_to(&payload, target).await {
                    Ok(_) => trace!("Discovery announce sent to {target}"),
                    Err(e) => warn!("Failed to send discovery announce: {e}"),
                }
            }
        }
    }
}

async fn run_heartbeat(
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
    expiry: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Heartbeat loop shutting down");
                break;
            }
            received = tokio::time::timeout(HEARTBEAT_RECV_TIMEOUT, socket.recv_from(&mut buf)) => received,
        };

        match received {
            Err(_) => trace!("No heartbeat within {HEARTBEAT_RECV_TIMEOUT:?}"),
            Ok(Ok((len, peer))) => match messages::decode::<HeartbeatMessage>(&buf[..len]) {
                Ok(heartbeat) => {
                    debug!("Heartbeat from {} ({peer})", heartbeat.ip);
                    registry.record(heartbeat).await;
                }
                Err(e) => warn!("Ignoring malformed heartbeat from {peer}: {e}"),
            },
            Ok(Err(e)) => warn!("Error receiving heartbeat: {e}"),
        }

        if let Some(max_age) = expiry {
            let dropped = registry.prune(max_age).await;
            if dropped > 0 {
                info!("Dropped {dropped} silent client(s)");
            }
        }
    }
}
