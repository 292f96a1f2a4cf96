use crate::config::Config;
use crate::control::{serve_connection, ControlRequest, ControlResponse};
use anyhow::{bail, Context, Result};
use daemonize::Daemonize;
use log::{error, info, warn};
use std::fs::File;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use wallsync::Coordinator;

pub const PID_FILE: &str = "/tmp/videowall.pid";
pub const LOG_FILE: &str = "/tmp/videowall.log";
pub const SOCKET_PATH: &str = "/tmp/videowall.sock";

pub fn start_daemon(config: Config, foreground: bool) -> Result<()> {
    if is_running() {
        println!("Daemon is already running!");
        process::exit(1);
    }

    if foreground {
        return daemon_logic(config);
    }

    let stdout = File::create(LOG_FILE)?;
    let stderr = stdout.try_clone()?;

    let daemonize = Daemonize::new()
        .pid_file(PID_FILE)
        .chown_pid_file(true)
        .working_directory("/tmp")
        .stdout(stdout)
        .stderr(stderr);

    match daemonize.start() {
        Ok(_) => {
            info!("Daemon started");
            if let Err(e) = daemon_logic(config) {
                error!("Daemon failed: {e:#}");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error starting daemon: {}", e);
            process::exit(1);
        }
    }
    Ok(())
}

pub fn daemon_logic(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        if Path::new(SOCKET_PATH).exists() {
            std::fs::remove_file(SOCKET_PATH).context("Failed to remove stale socket")?;
        }
        let listener = UnixListener::bind(SOCKET_PATH).context("Failed to bind control socket")?;

        let coordinator = Arc::new(
            Coordinator::from_config(config.wall)
                .await
                .context("Failed to start coordinator")?,
        );

        let mut terminate = signal(SignalKind::terminate())?;
        loop {
            tokio::select! {
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received interrupt");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let coordinator = coordinator.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, &coordinator).await {
                                    warn!("Control connection failed: {e:#}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
            }
        }

        coordinator.close().await;
        if let Err(e) = std::fs::remove_file(SOCKET_PATH) {
            warn!("Failed to remove control socket: {e}");
        }
        Ok::<(), anyhow::Error>(())
    })
}

pub fn check_status() -> Result<()> {
    if !is_running() {
        println!("Daemon is not running");
        return Ok(());
    }

    match send_request(&ControlRequest::Status)? {
        ControlResponse::Status {
            playing,
            duration_secs,
            position_secs,
        } => {
            println!("Daemon is running");
            println!("Playing: {playing}");
            println!("Position: {}", format_secs(position_secs));
            println!("Duration: {}", format_secs(duration_secs));
        }
        other => print_response(other)?,
    }
    Ok(())
}

pub fn stop_daemon() -> Result<()> {
    if !is_running() {
        println!("Daemon is not running");
        return Ok(());
    }

    let pid = read_pid().context("Failed to read pid file")?;

    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        bail!("Failed to signal daemon (pid {pid})");
    }

    println!("Daemon stopped");
    Ok(())
}

pub fn is_running() -> bool {
    if !PathBuf::from(PID_FILE).exists() {
        return false;
    }

    match read_pid() {
        Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
        None => false,
    }
}

fn read_pid() -> Option<i32> {
    let pid = std::fs::read_to_string(PID_FILE).ok()?;
    pid.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

pub fn send_request(request: &ControlRequest) -> Result<ControlResponse> {
    let mut stream = UnixStream::connect(SOCKET_PATH).context("Failed to connect to daemon")?;
    stream.write_all(&serde_json::to_vec(request)?)?;
    stream.shutdown(Shutdown::Write)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    serde_json::from_slice(&response).context("Malformed response from daemon")
}

/// Send `request` to the daemon and print whatever comes back.
pub fn run_command(request: ControlRequest) -> Result<()> {
    if !is_running() {
        println!("Daemon is not running");
        return Ok(());
    }
    print_response(send_request(&request)?)
}

fn print_response(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Pong => println!("pong"),
        ControlResponse::Scheduled {
            filename,
            base_time_nsecs,
        } => println!("Playing {filename} at base time {base_time_nsecs}"),
        ControlResponse::Status { playing, .. } => println!("Playing: {playing}"),
        ControlResponse::Files { filenames } => {
            for filename in filenames {
                println!("{filename}");
            }
        }
        ControlResponse::Clients { clients } => {
            if clients.is_empty() {
                println!("No clients");
            }
            for client in clients {
                println!(
                    "{:<16} {:<20} {:>8.1}s  {}",
                    client.ip, client.username, client.age_seconds, client.media_path
                );
            }
        }
        ControlResponse::Synced { copied } => println!("Copied {copied} file(s)"),
        ControlResponse::Error { message } => bail!(message),
    }
    Ok(())
}

fn format_secs(secs: Option<f64>) -> String {
    secs.map(|s| format!("{s:.1}s"))
        .unwrap_or_else(|| "-".to_string())
}
