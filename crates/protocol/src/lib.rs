//! # adbfs Protocol Library
//!
//! Message definitions and framing for the channel between a file manager
//! (the host) and the out-of-process `adbfs-worker` that browses Android
//! devices through `adb`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Envelope { Message }           │  MessagePack (named fields)
//! ├─────────────────────────────────────────┤
//! │              Framing                    │  Length-prefixed, LZ4
//! ├─────────────────────────────────────────┤
//! │         Unix domain socket              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Envelope, FrameCodec, Message};
//! use protocol::messages::UrlRequest;
//!
//! let envelope = Envelope::new(1, Message::ListDir(UrlRequest::new("adb://ABC123/sdcard")));
//! let bytes = envelope.to_msgpack().unwrap();
//!
//! let codec = FrameCodec::new();
//! let frame_bytes = codec.encode(&bytes).unwrap();
//! let (frame, _) = codec.decode(&frame_bytes).unwrap();
//! assert_eq!(Envelope::from_msgpack(&frame.payload).unwrap(), envelope);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request and response definitions
//! - [`framing`]: Frame codec with compression
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{
    Frame, FrameCodec, FrameFlags, COMPRESSION_THRESHOLD, FRAME_HEADER_SIZE, FRAME_MAGIC,
    MAX_FRAME_SIZE,
};
pub use messages::{Entry, EntryKind, Envelope, ErrorCode, Message, PROTOCOL_VERSION};
