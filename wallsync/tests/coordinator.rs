use serde_json::json;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use tokio::net::UdpSocket;

use wallsync::clock::now_nsecs;
use wallsync::messages::decode;
use wallsync::{
    ClientConfig, Coordinator, DirCatalog, DiscoveryMessage, PlayCommandMessage,
    ScheduledDecoder, WallConfig, WallError,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A fake node: listens where the coordinator broadcasts.
struct Wall {
    media: TempDir,
    discovery: UdpSocket,
    play: UdpSocket,
}

impl Wall {
    async fn new() -> Self {
        let media = tempdir().unwrap();
        std::fs::write(media.path().join("intro.mp4"), b"intro").unwrap();
        std::fs::write(media.path().join("outro.mp4"), b"outro").unwrap();
        Self {
            media,
            discovery: UdpSocket::bind((LOCALHOST, 0)).await.unwrap(),
            play: UdpSocket::bind((LOCALHOST, 0)).await.unwrap(),
        }
    }

    fn config(&self) -> WallConfig {
        WallConfig {
            media_path: self.media.path().to_path_buf(),
            base_time_offset: 0.0,
            ip: LOCALHOST,
            server_broadcast_port: self.discovery.local_addr().unwrap().port(),
            server_play_broadcast_port: self.play.local_addr().unwrap().port(),
            server_clock_port: 0,
            client_broadcast_port: 0,
            broadcast_interval: 1.0,
            broadcast_addr: LOCALHOST,
            client_expiry: None,
            client_config: ClientConfig::new(),
        }
    }

    async fn next_play(&self, wait: Duration) -> Option<PlayCommandMessage> {
        let mut buf = vec![0u8; 65_536];
        let (len, _) = tokio::time::timeout(wait, self.play.recv_from(&mut buf))
            .await
            .ok()?
            .unwrap();
        Some(decode(&buf[..len]).unwrap())
    }
}

async fn send_heartbeat(coordinator: &Coordinator, username: &str, ip: &str) {
    let node = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    let target = SocketAddr::new(LOCALHOST, coordinator.heartbeat_addr().port());
    let body = json!({"username": username, "ip": ip, "media_path": "/srv/media"});
    node.send_to(body.to_string().as_bytes(), target)
        .await
        .unwrap();
}

async fn wait_for_client(coordinator: &Coordinator, username: &str) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if coordinator
            .get_clients()
            .await
            .iter()
            .any(|c| c.username == username)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no heartbeat from {username}");
}

#[tokio::test]
async fn play_forwards_client_config_verbatim() {
    let wall = Wall::new().await;
    let mut config = wall.config();
    config.base_time_offset = 0.25;
    config
        .client_config
        .insert("10.0.0.5".to_string(), json!({"overlay_color": "red"}));
    let coordinator = Coordinator::from_config(config).await.unwrap();

    let base_time = coordinator.play("intro.mp4", true).await.unwrap();
    let command = wall.next_play(Duration::from_secs(2)).await.unwrap();

    assert_eq!(command.filename, "intro.mp4");
    assert!(command.time_overlay);
    assert_eq!(command.base_time_nsecs, base_time);
    assert_eq!(command.client_config["10.0.0.5"], json!({"overlay_color": "red"}));
    assert_eq!(command.clock_port, coordinator.clock_addr().port());
    assert!(coordinator.is_playing().await);

    coordinator.close().await;
}

#[tokio::test]
async fn base_time_is_after_the_send_even_with_zero_offset() {
    let wall = Wall::new().await;
    let coordinator = Coordinator::from_config(wall.config()).await.unwrap();

    coordinator.play("outro.mp4", false).await.unwrap();
    let command = wall.next_play(Duration::from_secs(2)).await.unwrap();
    assert!(command.base_time_nsecs > now_nsecs());

    coordinator.close().await;
}

#[tokio::test]
async fn unknown_file_is_not_found_and_sends_nothing() {
    let wall = Wall::new().await;
    let coordinator = Coordinator::from_config(wall.config()).await.unwrap();

    let result = coordinator.play("missing.mp4", false).await;
    assert!(matches!(result, Err(WallError::NotFound(name)) if name == "missing.mp4"));
    assert!(wall.next_play(Duration::from_millis(300)).await.is_none());
    assert!(!coordinator.is_playing().await);
    assert_eq!(coordinator.get_position().await, None);

    coordinator.close().await;
}

#[tokio::test]
async fn discovery_follows_the_configured_interval() {
    let wall = Wall::new().await;
    let coordinator = Coordinator::from_config(wall.config()).await.unwrap();

    let mut announces = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(3500);
    let mut buf = [0u8; 1024];
    while let Ok(Ok((len, _))) =
        tokio::time::timeout_at(deadline, wall.discovery.recv_from(&mut buf)).await
    {
        announces.push(decode::<DiscoveryMessage>(&buf[..len]).unwrap());
    }

    assert!(announces.len() >= 3, "only {} announces", announces.len());
    for announce in &announces {
        assert_eq!(announce.clock_ip, LOCALHOST);
        assert_eq!(announce.clock_port, coordinator.clock_addr().port());
    }

    coordinator.close().await;
}

#[tokio::test]
async fn heartbeats_show_up_as_clients() {
    let wall = Wall::new().await;
    let coordinator = Coordinator::from_config(wall.config()).await.unwrap();

    send_heartbeat(&coordinator, "left", "10.0.0.5").await;
    wait_for_client(&coordinator, "left").await;

    let clients = coordinator.get_clients().await;
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].ip, "10.0.0.5".parse::<IpAddr>().unwrap());
    assert_eq!(clients[0].media_path, "/srv/media");
    assert!(clients[0].age_seconds < 0.5);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let aged = coordinator.get_clients().await[0].age_seconds;
    assert!(aged >= 0.3);

    send_heartbeat(&coordinator, "left-again", "10.0.0.5").await;
    wait_for_client(&coordinator, "left-again").await;
    let clients = coordinator.get_clients().await;
    assert_eq!(clients.len(), 1);
    assert!(clients[0].age_seconds < aged);

    coordinator.close().await;
}

#[tokio::test]
async fn silent_clients_expire_when_configured() {
    let wall = Wall::new().await;
    let mut config = wall.config();
    config.client_expiry = Some(0.2);
    let coordinator = Coordinator::from_config(config).await.unwrap();

    send_heartbeat(&coordinator, "flaky", "10.0.0.9").await;
    wait_for_client(&coordinator, "flaky").await;

    // Pruning runs at least once per receive timeout.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(coordinator.get_clients().await.is_empty());

    coordinator.close().await;
}

#[tokio::test]
async fn close_stops_everything_and_frees_ports() {
    let wall = Wall::new().await;
    let coordinator = Coordinator::from_config(wall.config()).await.unwrap();
    let clock_addr = coordinator.clock_addr();
    let heartbeat_port = coordinator.heartbeat_addr().port();

    let started = Instant::now();
    coordinator.close().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    coordinator.close().await;

    UdpSocket::bind(clock_addr).await.unwrap();
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, heartbeat_port))
        .await
        .unwrap();

    // Drain whatever was announced before close; nothing may follow.
    let mut buf = [0u8; 1024];
    while tokio::time::timeout(Duration::from_millis(50), wall.discovery.recv_from(&mut buf))
        .await
        .is_ok()
    {}
    assert!(
        tokio::time::timeout(Duration::from_millis(1500), wall.discovery.recv_from(&mut buf))
            .await
            .is_err()
    );

    assert!(matches!(
        coordinator.play("intro.mp4", false).await,
        Err(WallError::Closed)
    ));
}

#[tokio::test]
async fn media_listing_and_sync_go_through_the_catalog() {
    let wall = Wall::new().await;
    let remote = tempdir().unwrap();
    std::fs::write(remote.path().join("loop.mp4"), b"loop").unwrap();

    let catalog = Arc::new(DirCatalog::new(wall.media.path()));
    let coordinator = Coordinator::start(wall.config(), catalog, Box::new(ScheduledDecoder::new()))
        .await
        .unwrap();

    assert_eq!(
        coordinator.get_media_filenames().unwrap(),
        vec!["intro.mp4", "outro.mp4"]
    );
    let copied = coordinator
        .sync_media(vec![remote.path().join("loop.mp4")])
        .await
        .unwrap();
    assert_eq!(copied, 1);
    assert_eq!(
        coordinator.get_media_filenames().unwrap(),
        vec!["intro.mp4", "loop.mp4", "outro.mp4"]
    );

    let missing = coordinator
        .sync_media(vec![remote.path().join("absent.mp4")])
        .await;
    assert!(matches!(missing, Err(WallError::SyncError(_))));

    coordinator.close().await;
}

#[tokio::test]
async fn invalid_config_binds_nothing() {
    let wall = Wall::new().await;
    let mut config = wall.config();
    config.broadcast_interval = -1.0;
    assert!(matches!(
        Coordinator::from_config(config).await,
        Err(WallError::InvalidConfig(_))
    ));
}
