use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::messages::HeartbeatMessage;

/// A node as last reported by its heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub username: String,
    pub ip: IpAddr,
    pub media_path: String,
    pub age_seconds: f64,
}

struct Entry {
    heartbeat: HeartbeatMessage,
    last_seen: Instant,
}

/// Last-seen table of heartbeat senders, one entry per node address.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<IpAddr, Entry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, heartbeat: HeartbeatMessage) {
        let ip = heartbeat.ip;
        let entry = Entry {
            heartbeat,
            last_seen: Instant::now(),
        };
        self.clients.lock().await.insert(ip, entry);
    }

    /// Current records with ages computed at call time, ordered by address.
    pub async fn snapshot(&self) -> Vec<ClientRecord> {
        let now = Instant::now();
        let mut records: Vec<ClientRecord> = {
            let clients = self.clients.lock().await;
            clients
                .values()
                .map(|entry| ClientRecord {
                    username: entry.heartbeat.username.clone(),
                    ip: entry.heartbeat.ip,
                    media_path: entry.heartbeat.media_path.clone(),
                    age_seconds: now.saturating_duration_since(entry.last_seen).as_secs_f64(),
                })
                .collect()
        };
        records.sort_by_key(|record| record.ip);
        records
    }

    /// Forget every node silent for longer than `max_age`. Returns how many were dropped.
    pub async fn prune(&self, max_age: Duration) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, entry| entry.last_seen.elapsed() <= max_age);
        before - clients.len()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
