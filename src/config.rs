use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use inquire::{CustomType, Text};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use wallsync::WallConfig;

const ENV_PREFIX: &str = "VIDEOWALL";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub wall: WallConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut wall = WallConfig::default();
        let videos = UserDirs::new().and_then(|dirs| dirs.video_dir().map(Path::to_path_buf));
        if let Some(videos) = videos {
            wall.media_path = videos.join("videowall");
        }
        Config {
            log_level: "info".to_string(),
            wall,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// Read `path`, writing defaults there first if it does not exist yet.
    /// `VIDEOWALL_*` variables override the file, e.g. `VIDEOWALL_WALL__SERVER_CLOCK_PORT`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_env(path, env_source())
    }

    fn load_with_env(path: &Path, env: config::Environment) -> Result<Self> {
        if !path.exists() {
            Config::default().save_to(path)?;
        }

        // toml keeps key case, which matters for the opaque client_config.
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        let overrides: EnvOverrides = config::Config::builder()
            .add_source(env)
            .build()
            .and_then(|settings| settings.try_deserialize())
            .context("Failed to read VIDEOWALL_* overrides")?;
        overrides.apply(&mut config);

        config.wall.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string(self)?;
        fs::write(path, contents).context("Failed to write config file")
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Scalar settings the environment may override. The config crate lowercases
/// keys, so `client_config` is only ever taken from the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvOverrides {
    log_level: Option<String>,
    wall: WallOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WallOverrides {
    media_path: Option<PathBuf>,
    base_time_offset: Option<f64>,
    ip: Option<IpAddr>,
    server_broadcast_port: Option<u16>,
    server_play_broadcast_port: Option<u16>,
    server_clock_port: Option<u16>,
    client_broadcast_port: Option<u16>,
    broadcast_interval: Option<f64>,
    broadcast_addr: Option<IpAddr>,
    client_expiry: Option<f64>,
}

impl EnvOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        let wall = &mut config.wall;
        let o = self.wall;
        if let Some(v) = o.media_path {
            wall.media_path = v;
        }
        if let Some(v) = o.base_time_offset {
            wall.base_time_offset = v;
        }
        if let Some(v) = o.ip {
            wall.ip = v;
        }
        if let Some(v) = o.server_broadcast_port {
            wall.server_broadcast_port = v;
        }
        if let Some(v) = o.server_play_broadcast_port {
            wall.server_play_broadcast_port = v;
        }
        if let Some(v) = o.server_clock_port {
            wall.server_clock_port = v;
        }
        if let Some(v) = o.client_broadcast_port {
            wall.client_broadcast_port = v;
        }
        if let Some(v) = o.broadcast_interval {
            wall.broadcast_interval = v;
        }
        if let Some(v) = o.broadcast_addr {
            wall.broadcast_addr = v;
        }
        if o.client_expiry.is_some() {
            wall.client_expiry = o.client_expiry;
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "videowall", "videowall")
        .context("Failed to determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}

impl Config {
    pub fn initialize_interactive() -> Result<Self> {
        println!("Welcome to videowall configuration!");
        let defaults = Config::default();

        let media_path = Text::new("Media directory:")
            .with_default(&defaults.wall.media_path.to_string_lossy())
            .prompt()?;

        let ip = CustomType::<IpAddr>::new("Address to bind the clock service to:")
            .with_default(defaults.wall.ip)
            .with_error_message("Please enter a valid IP address")
            .prompt()?;

        let broadcast_addr = CustomType::<IpAddr>::new("Broadcast address of the wall network:")
            .with_default(defaults.wall.broadcast_addr)
            .with_error_message("Please enter a valid IP address")
            .prompt()?;

        let base_time_offset = CustomType::<f64>::new("Seconds between play and start:")
            .with_default(defaults.wall.base_time_offset)
            .with_error_message("Please enter a number of seconds")
            .prompt()?;

        let broadcast_interval = CustomType::<f64>::new("Seconds between discovery announces:")
            .with_default(defaults.wall.broadcast_interval)
            .with_error_message("Please enter a number of seconds")
            .prompt()?;

        let config = Config {
            wall: WallConfig {
                media_path: PathBuf::from(media_path),
                ip,
                broadcast_addr,
                base_time_offset,
                broadcast_interval,
                ..defaults.wall
            },
            ..defaults
        };
        config.wall.validate()?;

        config.save()?;
        println!("Configuration saved successfully!");

        Ok(config)
    }
}
