//! Unix Domain Socket channel between a host and the worker.
//!
//! Each direction carries [`protocol::Envelope`]s, MessagePack encoded and
//! wrapped in `protocol::framing` frames. The host sends one request and
//! reads responses with the same request id until a `Finished` or `Error`.
//!
//! ## Socket Path
//!
//! The default socket path follows the XDG Base Directory Specification:
//! - Primary: `$XDG_RUNTIME_DIR/adbfs/worker.sock`
//! - Fallback: `/tmp/adbfs-$UID/worker.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use worker::dispatch::Dispatcher;
//! use worker::ipc::{get_socket_path, IpcServer};
//! use worker::AdbWorker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = IpcServer::bind(&get_socket_path()).await?;
//!     server.serve(Arc::new(Dispatcher::new(AdbWorker::default()))).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod server;

pub use client::{Reply, WorkerClient};
pub use server::{serve_connection, IpcConnection, IpcError, IpcServer};

use std::path::PathBuf;

/// Get the default socket path for the worker.
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/adbfs/worker.sock`
/// 2. Otherwise: `/tmp/adbfs-$UID/worker.sock`
#[cfg(unix)]
pub fn get_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => {
            PathBuf::from(runtime_dir).join("adbfs").join("worker.sock")
        }
        _ => {
            // Get UID by checking metadata of a file we own
            let uid = std::fs::metadata("/proc/self")
                .map(|m| m.uid())
                .unwrap_or(0);

            PathBuf::from(format!("/tmp/adbfs-{}", uid)).join("worker.sock")
        }
    }
}

/// Non-Unix platforms are not supported for Unix Domain Sockets.
#[cfg(not(unix))]
pub fn get_socket_path() -> PathBuf {
    PathBuf::from("/tmp/adbfs-unsupported/worker.sock")
}
