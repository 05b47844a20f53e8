//! Message definitions for the host/worker channel.
//!
//! The host sends one request envelope at a time. The worker answers with
//! zero or more data messages (`ListEntries`, `Redirection`, `FreeSpace`,
//! `Capabilities`, `Pong`) followed by exactly one terminal message,
//! `Finished` or `Error`, all carrying the request's id. Envelopes are
//! MessagePack-encoded with field names so optional fields can grow without
//! breaking older peers.

use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Envelope wrapper for all protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Id chosen by the host; echoed on every response to that request.
    pub request_id: u64,
    /// The actual message payload.
    pub payload: Message,
}

impl Envelope {
    /// Create a new envelope with the current protocol version.
    pub fn new(request_id: u64, payload: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id,
            payload,
        }
    }

    /// Serialize the envelope to MessagePack bytes.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Top-level message enum containing all message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    // Navigation requests
    /// List the children of a directory url.
    ListDir(UrlRequest),
    /// Report total and available bytes for the filesystem holding a url.
    FileSystemFreeSpace(UrlRequest),
    /// Ask which optional operations the worker implements.
    QueryCapabilities(CapabilitiesQuery),
    /// Liveness check.
    Ping(Ping),

    // Filesystem requests the worker accepts without acting on them
    Stat(UrlRequest),
    Get(UrlRequest),
    Put(PutRequest),
    Copy(CopyRequest),
    Rename(RenameRequest),
    Symlink(SymlinkRequest),
    Chmod(ChmodRequest),
    Chown(ChownRequest),
    SetModificationTime(SetModificationTimeRequest),
    Delete(DeleteRequest),
    Mkdir(MkdirRequest),

    // Responses
    /// A batch of directory entries.
    ListEntries(ListEntries),
    /// The requested url should be re-requested as another url.
    Redirection(Redirection),
    /// Free-space metadata.
    FreeSpace(FreeSpace),
    /// Answer to `QueryCapabilities`.
    Capabilities(Capabilities),
    /// Answer to `Ping`.
    Pong(Pong),
    /// The request completed successfully.
    Finished(Finished),
    /// The request failed; no further responses follow.
    Error(ErrorMessage),
}

impl Message {
    /// Whether this message is something a host may send.
    pub fn is_request(&self) -> bool {
        !matches!(
            self,
            Message::ListEntries(_)
                | Message::Redirection(_)
                | Message::FreeSpace(_)
                | Message::Capabilities(_)
                | Message::Pong(_)
                | Message::Finished(_)
                | Message::Error(_)
        )
    }

    /// Whether this message ends the response stream for a request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Finished(_) | Message::Error(_))
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Message::ListDir(_) => "listDir",
            Message::FileSystemFreeSpace(_) => "fileSystemFreeSpace",
            Message::QueryCapabilities(_) => "queryCapabilities",
            Message::Ping(_) => "ping",
            Message::Stat(_) => "stat",
            Message::Get(_) => "get",
            Message::Put(_) => "put",
            Message::Copy(_) => "copy",
            Message::Rename(_) => "rename",
            Message::Symlink(_) => "symlink",
            Message::Chmod(_) => "chmod",
            Message::Chown(_) => "chown",
            Message::SetModificationTime(_) => "setModificationTime",
            Message::Delete(_) => "del",
            Message::Mkdir(_) => "mkdir",
            Message::ListEntries(_) => "listEntries",
            Message::Redirection(_) => "redirection",
            Message::FreeSpace(_) => "freeSpace",
            Message::Capabilities(_) => "capabilities",
            Message::Pong(_) => "pong",
            Message::Finished(_) => "finished",
            Message::Error(_) => "error",
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// A request that only names a url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

impl UrlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Flags that accompany write-style requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    /// Replace an existing destination.
    pub overwrite: bool,
    /// Continue a partial transfer.
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub url: String,
    /// Permission bits for the new file, if the host wants them set.
    pub permissions: Option<u32>,
    pub flags: JobFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    pub source: String,
    pub dest: String,
    pub permissions: Option<u32>,
    pub flags: JobFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    pub source: String,
    pub dest: String,
    pub flags: JobFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkRequest {
    /// Link target, stored verbatim in the new link.
    pub target: String,
    pub dest: String,
    pub flags: JobFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChmodRequest {
    pub url: String,
    pub permissions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChownRequest {
    pub url: String,
    pub owner: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModificationTimeRequest {
    pub url: String,
    /// New modification time (Unix epoch seconds).
    pub mtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub url: String,
    /// `false` when the url names a directory.
    pub is_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub url: String,
    pub permissions: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesQuery {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Sender timestamp (Unix epoch milliseconds), echoed in the pong.
    pub timestamp: u64,
}

// =============================================================================
// Responses
// =============================================================================

/// Type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// One directory entry as the host sees it.
///
/// Devices at the virtual root and files on a device share this shape;
/// fields a source cannot fill stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry name (not full path).
    pub name: String,
    /// Name to show instead of `name`.
    pub display_name: Option<String>,
    pub kind: EntryKind,
    /// Permission bits, including setuid/setgid/sticky.
    pub mode: u32,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// Size in bytes. `None` for directories and special files.
    pub size: Option<u64>,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: Option<i64>,
    /// Raw symlink target as printed by the device.
    pub link_target: Option<String>,
    /// Symlink target resolved to an absolute url on the same device.
    pub target_url: Option<String>,
    /// Canonical url of the entry itself.
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub icon_name: Option<String>,
}

impl Entry {
    /// Entry with the given name and kind and every optional field empty.
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            kind,
            mode: 0,
            owner: None,
            group: None,
            size: None,
            modified: None,
            link_target: None,
            target_url: None,
            url: None,
            mime_type: None,
            icon_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntries {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirection {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpace {
    /// Filesystem size in bytes.
    pub total: u64,
    /// Bytes available to the device user.
    pub available: u64,
}

/// Optional operations a worker implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Url scheme the worker serves.
    pub scheme: String,
    pub list_dir: bool,
    pub free_space_query: bool,
    /// Whether file bytes can be read (`get`).
    pub reading: bool,
    /// Whether anything can be written (`put`, `mkdir`, ...).
    pub writing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finished {}

/// Error codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The url lacks a device or path where one is required.
    MalformedUrl,
    /// Free-space or metadata could not be determined.
    CouldNotStat,
    /// The bridge tool could not be started.
    CannotRunBridge,
    /// The bridge tool ran but reported failure and produced no entries.
    ListingFailed,
    /// The worker does not implement the requested operation.
    UnsupportedAction,
    /// The request could not be understood.
    InvalidRequest,
    /// Worker-side failure.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    /// Human-readable detail, usually the offending url or tool output.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let envelope = Envelope::new(42, msg);
        let bytes = envelope.to_msgpack().expect("serialization failed");
        let decoded = Envelope::from_msgpack(&bytes).expect("deserialization failed");
        assert_eq!(envelope, decoded);
    }

    fn sample_entry() -> Entry {
        Entry {
            mode: 0o777,
            owner: Some("root".to_string()),
            group: Some("root".to_string()),
            modified: Some(1_672_531_200),
            link_target: Some("/storage/self/primary".to_string()),
            target_url: Some("adb://ABC123/storage/self/primary".to_string()),
            url: Some("adb://ABC123/sdcard".to_string()),
            ..Entry::new("sdcard", EntryKind::Symlink)
        }
    }

    #[test]
    fn test_envelope_version() {
        let envelope = Envelope::new(1, Message::Ping(Ping { timestamp: 5 }));
        assert_eq!(envelope.version, PROTOCOL_VERSION);
        assert_eq!(envelope.request_id, 1);
    }

    #[test]
    fn test_list_entries_roundtrip() {
        roundtrip(Message::ListEntries(ListEntries {
            entries: vec![sample_entry(), Entry::new("Download", EntryKind::Directory)],
        }));
    }

    #[test]
    fn test_empty_payload_structs_roundtrip() {
        roundtrip(Message::Finished(Finished {}));
        roundtrip(Message::QueryCapabilities(CapabilitiesQuery {}));
    }

    #[test]
    fn test_write_requests_roundtrip() {
        roundtrip(Message::Copy(CopyRequest {
            source: "adb://ABC123/sdcard/a.txt".to_string(),
            dest: "adb://ABC123/sdcard/b.txt".to_string(),
            permissions: Some(0o644),
            flags: JobFlags {
                overwrite: true,
                resume: false,
            },
        }));
        roundtrip(Message::SetModificationTime(SetModificationTimeRequest {
            url: "adb://ABC123/sdcard/a.txt".to_string(),
            mtime: -1,
        }));
    }

    #[test]
    fn test_error_roundtrip() {
        roundtrip(Message::Error(ErrorMessage {
            code: ErrorCode::MalformedUrl,
            message: "adb:///".to_string(),
        }));
    }

    #[test]
    fn test_request_classification() {
        assert!(Message::ListDir(UrlRequest::new("adb:/")).is_request());
        assert!(Message::Chmod(ChmodRequest {
            url: "adb://ABC123/x".to_string(),
            permissions: 0o600,
        })
        .is_request());
        assert!(!Message::Finished(Finished {}).is_request());
        assert!(!Message::Pong(Pong::default()).is_request());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Message::Finished(Finished {}).is_terminal());
        assert!(Message::Error(ErrorMessage {
            code: ErrorCode::Internal,
            message: String::new(),
        })
        .is_terminal());
        assert!(!Message::ListEntries(ListEntries::default()).is_terminal());
        assert!(!Message::Redirection(Redirection {
            url: "adb://ABC123/".to_string()
        })
        .is_terminal());
    }

    #[test]
    fn test_entry_new_leaves_optionals_empty() {
        let entry = Entry::new("Music", EntryKind::Directory);
        assert_eq!(entry.mode, 0);
        assert!(entry.size.is_none());
        assert!(entry.link_target.is_none());
        assert!(entry.kind.is_dir());
    }

    #[test]
    fn test_large_listing_is_compact_enough_for_one_frame() {
        let entries = (0..1000)
            .map(|i| Entry {
                size: Some(i),
                ..Entry::new(format!("IMG_{:04}.jpg", i), EntryKind::Regular)
            })
            .collect();
        let bytes = Envelope::new(1, Message::ListEntries(ListEntries { entries }))
            .to_msgpack()
            .unwrap();
        assert!(bytes.len() < crate::framing::MAX_FRAME_SIZE);
    }
}
