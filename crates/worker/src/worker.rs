//! The worker operation set and its adb-backed implementation.
//!
//! [`Worker`] is everything a host can ask of a worker. Only listing, the
//! free-space query, and the capability query do real work; the file
//! operations are accepted and completed without touching the device.

use protocol::messages::{Capabilities, ErrorCode, ErrorMessage, FreeSpace, JobFlags};
use protocol::Entry;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::adb::{parse_devices, parse_free_space, parse_listing, AdbBridge, BridgeError};
use crate::adb::{CommandRunner, Device, ProcessRunner};
use crate::location::{self, SCHEME};

/// Errors reported back to the host for a single request.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The url lacks a device or path where one is required, or is not an
    /// `adb://` url at all.
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    /// Nothing usable came back for the url.
    #[error("could not stat {0}")]
    CouldNotStat(String),

    /// The bridge tool could not be started.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The bridge tool ran, failed, and produced nothing parseable.
    #[error("listing {url} failed: {reason}")]
    ListingFailed { url: String, reason: String },

    /// The operation is not implemented by this worker.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

impl WorkerError {
    /// Wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkerError::MalformedUrl(_) => ErrorCode::MalformedUrl,
            WorkerError::CouldNotStat(_) => ErrorCode::CouldNotStat,
            WorkerError::Bridge(_) => ErrorCode::CannotRunBridge,
            WorkerError::ListingFailed { .. } => ErrorCode::ListingFailed,
            WorkerError::Unsupported(_) => ErrorCode::UnsupportedAction,
        }
    }

    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Outcome of listing a url.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// The url is not canonical; the host should list this one instead.
    Redirect(Url),
    /// Directory contents in the order the device returned them.
    Entries(Vec<Entry>),
}

/// Operations a host can invoke on a worker.
///
/// Every method blocks until the operation completes. The file operations
/// default to [`WorkerError::Unsupported`].
pub trait Worker: Send + Sync {
    /// What this worker can do.
    fn capabilities(&self) -> Capabilities;

    fn list_dir(&self, url: &Url) -> WorkerResult<Listing>;

    fn file_system_free_space(&self, url: &Url) -> WorkerResult<FreeSpace>;

    fn stat(&self, _url: &Url) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("stat"))
    }

    fn get(&self, _url: &Url) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("get"))
    }

    fn put(&self, _url: &Url, _permissions: Option<u32>, _flags: JobFlags) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("put"))
    }

    fn copy(
        &self,
        _source: &Url,
        _dest: &Url,
        _permissions: Option<u32>,
        _flags: JobFlags,
    ) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("copy"))
    }

    fn rename(&self, _source: &Url, _dest: &Url, _flags: JobFlags) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("rename"))
    }

    fn symlink(&self, _target: &str, _dest: &Url, _flags: JobFlags) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("symlink"))
    }

    fn chmod(&self, _url: &Url, _permissions: u32) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("chmod"))
    }

    fn chown(&self, _url: &Url, _owner: &str, _group: &str) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("chown"))
    }

    fn set_modification_time(&self, _url: &Url, _mtime: i64) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("setModificationTime"))
    }

    fn delete(&self, _url: &Url, _is_file: bool) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("del"))
    }

    fn mkdir(&self, _url: &Url, _permissions: Option<u32>) -> WorkerResult<()> {
        Err(WorkerError::Unsupported("mkdir"))
    }
}

/// A [`Worker`] that browses Android devices through `adb`.
#[derive(Debug, Clone)]
pub struct AdbWorker<R = ProcessRunner> {
    bridge: AdbBridge<R>,
    show_hidden: bool,
}

impl Default for AdbWorker<ProcessRunner> {
    fn default() -> Self {
        Self::new(AdbBridge::default())
    }
}

impl<R: CommandRunner> AdbWorker<R> {
    pub fn new(bridge: AdbBridge<R>) -> Self {
        Self {
            bridge,
            show_hidden: true,
        }
    }

    /// Whether dot-files are included in listings.
    pub fn with_show_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = show_hidden;
        self
    }

    pub fn bridge(&self) -> &AdbBridge<R> {
        &self.bridge
    }

    /// Devices currently connected and authorized.
    ///
    /// No devices is an empty, successful result. A bridge that exits with a
    /// failure status is an error even if it printed something.
    pub fn list_devices(&self) -> WorkerResult<Vec<Device>> {
        let output = self.bridge.devices()?;
        if !output.succeeded() {
            return Err(WorkerError::ListingFailed {
                url: format!("{}:/", SCHEME),
                reason: output.summary(),
            });
        }
        let devices: Vec<Device> = parse_devices(&output.text).collect();
        debug!(count = devices.len(), "enumerated devices");
        Ok(devices)
    }

    fn list_remote(&self, url: &Url, device: &str, path: &str) -> WorkerResult<Vec<Entry>> {
        let output = self.bridge.list_directory(device, path)?;

        let entries: Vec<Entry> = parse_listing(&output.text, url)
            .filter(|entry| !entry.is_self_or_parent())
            .filter(|entry| self.show_hidden || !entry.name.starts_with('.'))
            .map(|entry| entry.to_entry(url))
            .collect();

        if !output.succeeded() {
            if entries.is_empty() {
                return Err(WorkerError::ListingFailed {
                    url: url.to_string(),
                    reason: output.summary(),
                });
            }
            warn!(
                device,
                path,
                status = ?output.status,
                count = entries.len(),
                "ls exited with failure, keeping the entries it printed"
            );
        }

        debug!(device, path, count = entries.len(), "listed directory");
        Ok(entries)
    }
}

fn require_scheme(url: &Url) -> WorkerResult<()> {
    if url.scheme() == SCHEME {
        Ok(())
    } else {
        Err(WorkerError::MalformedUrl(url.to_string()))
    }
}

impl<R: CommandRunner> Worker for AdbWorker<R> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            scheme: SCHEME.to_string(),
            list_dir: true,
            free_space_query: true,
            reading: false,
            writing: false,
        }
    }

    fn list_dir(&self, url: &Url) -> WorkerResult<Listing> {
        debug!(%url, "listDir");
        require_scheme(url)?;

        let Some(device) = location::device_id(url) else {
            let entries = self.list_devices()?.iter().map(Device::to_entry).collect();
            return Ok(Listing::Entries(entries));
        };

        let Some(path) = location::remote_path(url) else {
            let root = location::device_root(url);
            debug!(%url, redirect = %root, "device url without path");
            return Ok(Listing::Redirect(root));
        };

        self.list_remote(url, &device, &path).map(Listing::Entries)
    }

    fn file_system_free_space(&self, url: &Url) -> WorkerResult<FreeSpace> {
        debug!(%url, "fileSystemFreeSpace");
        require_scheme(url)?;

        let (Some(device), Some(path)) = (location::device_id(url), location::remote_path(url))
        else {
            return Err(WorkerError::MalformedUrl(url.to_string()));
        };

        let output = self.bridge.disk_free(&device, &path)?;
        parse_free_space(&output.text).ok_or_else(|| {
            debug!(%url, output = %output.summary(), "no df row matched");
            WorkerError::CouldNotStat(url.to_string())
        })
    }

    fn stat(&self, url: &Url) -> WorkerResult<()> {
        debug!(%url, "stat");
        Ok(())
    }

    fn get(&self, url: &Url) -> WorkerResult<()> {
        debug!(%url, "get");
        Ok(())
    }

    fn put(&self, url: &Url, permissions: Option<u32>, flags: JobFlags) -> WorkerResult<()> {
        debug!(%url, ?permissions, ?flags, "put");
        Ok(())
    }

    fn copy(
        &self,
        source: &Url,
        dest: &Url,
        permissions: Option<u32>,
        flags: JobFlags,
    ) -> WorkerResult<()> {
        debug!(%source, %dest, ?permissions, ?flags, "copy");
        Ok(())
    }

    fn rename(&self, source: &Url, dest: &Url, flags: JobFlags) -> WorkerResult<()> {
        debug!(%source, %dest, ?flags, "rename");
        Ok(())
    }

    fn symlink(&self, target: &str, dest: &Url, flags: JobFlags) -> WorkerResult<()> {
        debug!(link_target = target, %dest, ?flags, "symlink");
        Ok(())
    }

    fn chmod(&self, url: &Url, permissions: u32) -> WorkerResult<()> {
        debug!(%url, permissions = %format!("{:o}", permissions), "chmod");
        Ok(())
    }

    fn chown(&self, url: &Url, owner: &str, group: &str) -> WorkerResult<()> {
        debug!(%url, owner, group, "chown");
        Ok(())
    }

    fn set_modification_time(&self, url: &Url, mtime: i64) -> WorkerResult<()> {
        debug!(%url, mtime, "setModificationTime");
        Ok(())
    }

    fn delete(&self, url: &Url, is_file: bool) -> WorkerResult<()> {
        debug!(%url, is_file, "del");
        Ok(())
    }

    fn mkdir(&self, url: &Url, permissions: Option<u32>) -> WorkerResult<()> {
        debug!(%url, ?permissions, "mkdir");
        Ok(())
    }
}
