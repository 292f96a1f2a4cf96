//! Datagrams exchanged between the coordinator and the display nodes.
//!
//! Each message travels as a single UDP datagram carrying one JSON object.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::Result;

/// Per-node configuration, keyed by node address. Values are never inspected.
pub type ClientConfig = HashMap<String, serde_json::Value>;

/// Periodic announce telling nodes where the clock service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    pub clock_ip: IpAddr,
    pub clock_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayCommandMessage {
    pub filename: String,
    /// Absolute start time in the clock service's domain (ns since the Unix epoch).
    pub base_time_nsecs: u64,
    pub time_overlay: bool,
    #[serde(default)]
    pub client_config: ClientConfig,
    pub clock_ip: IpAddr,
    pub clock_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub username: String,
    pub ip: IpAddr,
    pub media_path: String,
}

/// Serialize a message into the bytes of one datagram.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heartbeat_ignores_unknown_fields() {
        let raw = br#"{"username":"wall-3","ip":"10.0.0.7","media_path":"/srv/media","uptime":12}"#;
        let hb: HeartbeatMessage = decode(raw).unwrap();
        assert_eq!(hb.username, "wall-3");
        assert_eq!(hb.ip, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(hb.media_path, "/srv/media");
    }

    #[test]
    fn heartbeat_with_bad_address_is_rejected() {
        let raw = br#"{"username":"wall-3","ip":"not-an-ip","media_path":"/srv/media"}"#;
        assert!(decode::<HeartbeatMessage>(raw).is_err());
    }

    #[test]
    fn play_command_keeps_client_config_verbatim() {
        let mut client_config = ClientConfig::new();
        client_config.insert(
            "10.0.0.5".to_string(),
            json!({"overlay_color": "red", "crop": [0, 0, 1920, 1080], "extra": null}),
        );
        let msg = PlayCommandMessage {
            filename: "intro.mp4".to_string(),
            base_time_nsecs: 1_700_000_000_000_000_000,
            time_overlay: true,
            client_config,
            clock_ip: "10.0.0.1".parse().unwrap(),
            clock_port: 49002,
        };

        let value: serde_json::Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
        assert_eq!(value["filename"], "intro.mp4");
        assert_eq!(value["base_time_nsecs"], 1_700_000_000_000_000_000u64);
        assert_eq!(
            value["client_config"]["10.0.0.5"],
            json!({"overlay_color": "red", "crop": [0, 0, 1920, 1080], "extra": null})
        );
    }

    #[test]
    fn discovery_uses_plain_field_names() {
        let msg = DiscoveryMessage {
            clock_ip: "192.168.1.10".parse().unwrap(),
            clock_port: 49002,
        };
        let text = String::from_utf8(encode(&msg).unwrap()).unwrap();
        assert_eq!(text, r#"{"clock_ip":"192.168.1.10","clock_port":49002}"#);
    }
}
