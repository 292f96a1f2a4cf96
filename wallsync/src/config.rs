use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::messages::ClientConfig;
use crate::{Result, WallError};

/// Everything the coordinator needs to bind its sockets and schedule playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub media_path: PathBuf,
    /// Seconds added to "now" when scheduling a play.
    pub base_time_offset: f64,
    pub ip: IpAddr,
    pub server_broadcast_port: u16,
    pub server_play_broadcast_port: u16,
    pub server_clock_port: u16,
    pub client_broadcast_port: u16,
    /// Seconds between discovery announces.
    pub broadcast_interval: f64,
    pub broadcast_addr: IpAddr,
    /// Drop clients silent for longer than this many seconds. Unset keeps them forever.
    pub client_expiry: Option<f64>,
    pub client_config: ClientConfig,
}

impl Default for WallConfig {
    fn default() -> Self {
        WallConfig {
            media_path: PathBuf::from("media"),
            base_time_offset: 1.0,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_broadcast_port: 49000,
            server_play_broadcast_port: 49001,
            server_clock_port: 49002,
            client_broadcast_port: 49003,
            broadcast_interval: 1.0,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            client_expiry: None,
            client_config: ClientConfig::new(),
        }
    }
}

impl WallConfig {
    pub fn base_time_offset(&self) -> Result<Duration> {
        seconds("base_time_offset", self.base_time_offset)
    }

    pub fn broadcast_interval(&self) -> Result<Duration> {
        let interval = seconds("broadcast_interval", self.broadcast_interval)?;
        if interval.is_zero() {
            return Err(WallError::InvalidConfig(
                "broadcast_interval must be greater than zero".to_string(),
            ));
        }
        Ok(interval)
    }

    pub fn client_expiry(&self) -> Result<Option<Duration>> {
        self.client_expiry
            .map(|secs| seconds("client_expiry", secs))
            .transpose()
    }

    /// Check every duration up front so a bad file fails before any socket is bound.
    pub fn validate(&self) -> Result<()> {
        self.base_time_offset()?;
        self.broadcast_interval()?;
        self.client_expiry()?;
        Ok(())
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| WallError::InvalidConfig(format!("{name} = {value}: {e}")))
}
