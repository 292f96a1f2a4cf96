mod cli;
mod config;
mod control;
mod daemon;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::control::ControlRequest;
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { foreground } => {
            let config = Config::load()?;
            init_logging(&config.log_level);
            daemon::start_daemon(config, foreground)
        }
        Commands::Status => daemon::check_status(),
        Commands::Stop => daemon::stop_daemon(),
        Commands::Ping => daemon::run_command(ControlRequest::Ping),
        Commands::Play {
            filename,
            time_overlay,
        } => daemon::run_command(ControlRequest::Play {
            filename,
            time_overlay,
        }),
        Commands::Clients => daemon::run_command(ControlRequest::Clients),
        Commands::Files => daemon::run_command(ControlRequest::Files),
        Commands::Sync { remote_paths } => {
            daemon::run_command(ControlRequest::Sync { remote_paths })
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigCommands::Init => Config::initialize_interactive().map(|_| ()),
            ConfigCommands::Set {
                media_path,
                ip,
                broadcast_addr,
                base_time_offset,
                broadcast_interval,
            } => {
                let mut config = Config::load()?;
                if let Some(media_path) = media_path {
                    config.wall.media_path = media_path;
                }
                if let Some(ip) = ip {
                    config.wall.ip = ip;
                }
                if let Some(broadcast_addr) = broadcast_addr {
                    config.wall.broadcast_addr = broadcast_addr;
                }
                if let Some(offset) = base_time_offset {
                    config.wall.base_time_offset = offset;
                }
                if let Some(interval) = broadcast_interval {
                    config.wall.broadcast_interval = interval;
                }
                config.wall.validate()?;
                config.save()?;
                println!("Configuration updated");
                Ok(())
            }
        },
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}
