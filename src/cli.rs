use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the coordinator daemon
    Start {
        /// Stay in the foreground instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },
    /// Check if the daemon is running
    Status,
    /// Stop the daemon
    Stop,
    /// Ping the daemon
    Ping,
    /// Schedule a media file on every node
    Play {
        filename: String,
        /// Ask nodes to draw the time overlay
        #[arg(long)]
        time_overlay: bool,
    },
    /// List nodes that have sent heartbeats
    Clients,
    /// List playable media
    Files,
    /// Copy media from the given paths into the media directory
    Sync {
        #[arg(required = true)]
        remote_paths: Vec<PathBuf>,
    },
    /// Configure the daemon
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set configuration values
    Set {
        #[arg(long)]
        media_path: Option<PathBuf>,
        #[arg(long)]
        ip: Option<IpAddr>,
        #[arg(long)]
        broadcast_addr: Option<IpAddr>,
        /// Seconds between scheduling and playback start
        #[arg(long)]
        base_time_offset: Option<f64>,
        /// Seconds between discovery announces
        #[arg(long)]
        broadcast_interval: Option<f64>,
    },
    /// Show current configuration
    Show,
    /// Initialize configuration interactively
    Init,
}
