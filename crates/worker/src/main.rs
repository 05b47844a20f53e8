//! adbfs worker
//!
//! Out-of-process worker that lets a file manager browse Android devices
//! through `adb`, plus a few commands for using the same code from a shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use protocol::Entry;
use tokio::net::UnixStream;
use url::Url;
use worker::adb::permissions::{format_permissions, kind_flag};
use worker::config::Config;
use worker::ipc::{serve_connection, IpcConnection, IpcServer, WorkerClient};
use worker::{logging, AdbBridge, AdbWorker, Dispatcher, Listing, ProcessRunner, Worker};

/// Timeout for talking to a running worker.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// adbfs worker - browse Android devices over adb from a file manager.
#[derive(Parser, Debug)]
#[command(name = "adbfs-worker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the worker.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Listen on a socket and serve hosts one at a time
    Serve {
        /// Socket path (defaults to the configured one)
        #[arg(long, short)]
        socket: Option<PathBuf>,
    },

    /// Connect to a host's socket and serve that channel
    Connect {
        /// Socket the host is listening on
        socket: PathBuf,
    },

    /// List connected devices
    Devices {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List an adb:// url
    Ls {
        /// Url such as adb://emulator-5554/sdcard
        url: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show free space for an adb:// url
    Df {
        /// Url such as adb://emulator-5554/sdcard
        url: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a running worker to list an adb:// url
    Query {
        /// Url such as adb://emulator-5554/sdcard
        url: String,

        /// Socket path (defaults to the configured one)
        #[arg(long, short)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    if let Some(file) = cli.log_file {
        config.logging.file = Some(file);
    }

    let _log_guard = logging::init(
        &config.logging.level,
        cli.verbose,
        config.logging.file.as_deref(),
    )?;
    tracing::debug!(command = ?cli.command, "adbfs-worker starting");

    match cli.command {
        Commands::Serve { socket } => {
            let dispatcher = build_dispatcher(&config)?;
            let socket = socket.unwrap_or_else(|| config.ipc.socket_path.clone());
            serve(&socket, dispatcher).await?;
        }
        Commands::Connect { socket } => {
            let dispatcher = build_dispatcher(&config)?;
            let stream = UnixStream::connect(&socket)
                .await
                .with_context(|| format!("Cannot connect to host socket: {}", socket.display()))?;
            tracing::info!(socket = %socket.display(), "connected to host");
            serve_connection(IpcConnection::new(stream), dispatcher).await?;
            tracing::info!("host closed the channel");
        }
        Commands::Devices { json } => {
            let worker = build_worker(&config)?;
            let devices = tokio::task::spawn_blocking(move || worker.list_devices()).await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No devices connected.");
            } else {
                for device in devices {
                    println!("{:<24} {:<20} {}", device.id, device.model, device.device);
                }
            }
        }
        Commands::Ls { url, json } => {
            let url = parse_url(&url)?;
            let worker = build_worker(&config)?;
            let entries =
                tokio::task::spawn_blocking(move || list_following_redirect(&worker, url)).await??;
            print_entries(&entries, json)?;
        }
        Commands::Df { url, json } => {
            let url = parse_url(&url)?;
            let worker = build_worker(&config)?;
            let space =
                tokio::task::spawn_blocking(move || worker.file_system_free_space(&url)).await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&space)?);
            } else {
                println!("total:     {} bytes", space.total);
                println!("available: {} bytes", space.available);
            }
        }
        Commands::Query { url, socket } => {
            let socket = socket.unwrap_or_else(|| config.ipc.socket_path.clone());
            query(&socket, &url).await?;
        }
    }

    Ok(())
}

/// Validate the configuration and build a worker from it.
fn build_worker(config: &Config) -> anyhow::Result<AdbWorker<ProcessRunner>> {
    config.validate()?;
    let bridge = AdbBridge::new(config.bridge.adb_path.clone(), ProcessRunner);
    Ok(AdbWorker::new(bridge).with_show_hidden(config.listing.show_hidden))
}

fn build_dispatcher(config: &Config) -> anyhow::Result<Arc<Dispatcher<AdbWorker<ProcessRunner>>>> {
    let worker = build_worker(config)?;
    Ok(Arc::new(Dispatcher::new(worker).with_batch_size(config.listing.batch_size)))
}

fn parse_url(raw: &str) -> anyhow::Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid url: {}", raw))
}

/// List `url`, following at most one redirect.
fn list_following_redirect<W: Worker>(worker: &W, url: Url) -> anyhow::Result<Vec<Entry>> {
    match worker.list_dir(&url)? {
        Listing::Entries(entries) => Ok(entries),
        Listing::Redirect(target) => {
            tracing::debug!(from = %url, to = %target, "following redirect");
            match worker.list_dir(&target)? {
                Listing::Entries(entries) => Ok(entries),
                Listing::Redirect(again) => bail!("{} redirected twice (to {})", url, again),
            }
        }
    }
}

async fn serve(
    socket: &Path,
    dispatcher: Arc<Dispatcher<AdbWorker<ProcessRunner>>>,
) -> anyhow::Result<()> {
    let server = IpcServer::bind(socket)
        .await
        .with_context(|| format!("Cannot bind socket: {}", socket.display()))?;
    tracing::info!(socket = %socket.display(), "worker listening");

    let result = tokio::select! {
        served = server.serve(dispatcher) => served.map_err(anyhow::Error::from),
        signal = wait_for_shutdown_signal() => signal,
    };

    if let Err(e) = std::fs::remove_file(socket) {
        tracing::warn!(socket = %socket.display(), error = %e, "failed to remove socket");
    }
    result
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

async fn query(socket: &Path, url: &str) -> anyhow::Result<()> {
    let mut client = WorkerClient::connect_with_timeout(socket, QUERY_TIMEOUT)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot connect to worker at {}: {}", socket.display(), e))?;

    let mut reply = client.list_dir(url).await?;
    if let Some(target) = reply.redirection().map(str::to_string) {
        reply = client.list_dir(&target).await?;
    }
    if let Some(err) = reply.error {
        bail!("{:?}: {}", err.code, err.message);
    }

    print_entries(&reply.entries(), false)
}

fn print_entries(entries: &[Entry], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else {
        for entry in entries {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}

/// Render an entry as one `ls -l` style line.
fn format_entry(entry: &Entry) -> String {
    let modified = entry
        .modified
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16));
    let size = entry
        .size
        .map(|s| s.to_string())
        .unwrap_or_default();
    let name = match (&entry.display_name, &entry.link_target) {
        (_, Some(target)) => format!("{} -> {}", entry.name, target),
        (Some(display), None) => format!("{} ({})", entry.name, display),
        (None, None) => entry.name.clone(),
    };

    format!(
        "{}{} {:<10} {:<10} {:>12} {} {}",
        kind_flag(entry.kind),
        format_permissions(entry.mode),
        entry.owner.as_deref().unwrap_or("-"),
        entry.group.as_deref().unwrap_or("-"),
        size,
        modified,
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use protocol::EntryKind;
    use worker::adb::{CommandOutput, ScriptedRunner};

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["adbfs-worker", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { socket } => assert!(socket.is_none()),
            _ => panic!("Expected Serve command"),
        }

        let cli =
            Cli::try_parse_from(["adbfs-worker", "serve", "--socket", "/tmp/w.sock"]).unwrap();
        match cli.command {
            Commands::Serve { socket } => assert_eq!(socket, Some(PathBuf::from("/tmp/w.sock"))),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_connect_requires_socket() {
        assert!(Cli::try_parse_from(["adbfs-worker", "connect"]).is_err());
        let cli = Cli::try_parse_from(["adbfs-worker", "connect", "/run/host.sock"]).unwrap();
        assert!(matches!(cli.command, Commands::Connect { .. }));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "adbfs-worker",
            "ls",
            "adb://ABC123/sdcard",
            "--json",
            "-v",
            "--log-file",
            "/tmp/adbfs.log",
            "--config",
            "/etc/adbfs.toml",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/adbfs.log")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/adbfs.toml")));
        match cli.command {
            Commands::Ls { url, json } => {
                assert_eq!(url, "adb://ABC123/sdcard");
                assert!(json);
            }
            _ => panic!("Expected Ls command"),
        }
    }

    #[test]
    fn test_ls_follows_one_redirect() {
        let runner = ScriptedRunner::new().on(
            &["-s", "ABC123", "shell", "ls -l -a '/'"],
            CommandOutput::success("drwxr-xr-x root root 2023-01-01 00:00 sdcard\n"),
        );
        let worker = AdbWorker::new(AdbBridge::new("adb", runner));

        let entries = list_following_redirect(&worker, parse_url("adb://ABC123").unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "sdcard");
    }

    #[test]
    fn test_format_entry() {
        let entry = Entry {
            mode: 0o755,
            owner: Some("system".to_string()),
            group: Some("sdcard_rw".to_string()),
            link_target: Some("/storage/self/primary".to_string()),
            ..Entry::new("sdcard", EntryKind::Symlink)
        };

        let line = format_entry(&entry);
        assert!(line.starts_with("lrwxr-xr-x system"));
        assert!(line.ends_with("sdcard -> /storage/self/primary"));
    }

    #[test]
    fn test_format_device_entry() {
        let entry = Entry {
            display_name: Some("Pixel_5".to_string()),
            mode: 0o444,
            ..Entry::new("ABC123", EntryKind::Directory)
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("dr--r--r--"));
        assert!(line.ends_with("ABC123 (Pixel_5)"));
    }
}
