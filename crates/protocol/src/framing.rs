//! Length-prefixed frames carried over the host/worker channel.
//!
//! # Frame Format
//!
//! - 4 bytes: magic bytes "ADBW"
//! - 4 bytes: content length (big-endian, flags byte plus payload)
//! - 1 byte: flags (bit 0 = compressed)
//! - N bytes: payload, LZ4 compressed when the flag is set
//!
//! Large directory listings are the only payloads that regularly exceed the
//! compression threshold; they compress well because owner, group and
//! timestamp columns repeat.

use crate::error::{ProtocolError, Result};

/// Magic bytes identifying an adbfs frame.
pub const FRAME_MAGIC: [u8; 4] = *b"ADBW";

/// Payloads larger than this are compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header size: 4 (magic) + 4 (length) + 1 (flags) = 9 bytes.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Length of the magic + length prefix that precedes the content.
const PREFIX_SIZE: usize = 8;

/// Flags describing a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Payload is LZ4 compressed.
    pub const COMPRESSED: u8 = 0b0000_0001;

    /// Empty flag set.
    #[inline]
    pub fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Return a copy with the compressed flag set or cleared.
    #[inline]
    pub fn with_compressed(self, compressed: bool) -> Self {
        if compressed {
            Self(self.0 | Self::COMPRESSED)
        } else {
            Self(self.0 & !Self::COMPRESSED)
        }
    }
}

/// A decoded frame. The payload is always held uncompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: FrameFlags,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags::new(),
            payload,
        }
    }
}

/// Encoder and decoder for frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compression_enabled: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Codec that compresses payloads above [`COMPRESSION_THRESHOLD`].
    pub fn new() -> Self {
        Self {
            compression_enabled: true,
        }
    }

    /// Codec that never compresses. It still decodes compressed frames.
    pub fn without_compression() -> Self {
        Self {
            compression_enabled: false,
        }
    }

    /// Encode a payload into a complete frame.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_FRAME_SIZE - FRAME_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len() + FRAME_HEADER_SIZE,
                max: MAX_FRAME_SIZE,
            });
        }

        let compressed = if self.compression_enabled && payload.len() > COMPRESSION_THRESHOLD {
            let packed = lz4_flex::compress_prepend_size(payload);
            (packed.len() < payload.len()).then_some(packed)
        } else {
            None
        };

        let (flags, body) = match &compressed {
            Some(packed) => (FrameFlags::new().with_compressed(true), packed.as_slice()),
            None => (FrameFlags::new(), payload),
        };

        let content_len = 1 + body.len();
        let mut output = Vec::with_capacity(PREFIX_SIZE + content_len);
        output.extend_from_slice(&FRAME_MAGIC);
        output.extend_from_slice(&(content_len as u32).to_be_bytes());
        output.push(flags.as_byte());
        output.extend_from_slice(body);

        Ok(output)
    }

    /// Decode one frame from the start of `data`.
    ///
    /// Returns the frame and the number of bytes consumed. Missing bytes are
    /// an error here; use [`FrameCodec::try_decode`] on a streaming buffer.
    pub fn decode(&self, data: &[u8]) -> Result<(Frame, usize)> {
        match self.try_decode(data)? {
            Some(decoded) => Ok(decoded),
            None => Err(ProtocolError::Deserialization(format!(
                "insufficient data for frame: have {} bytes",
                data.len()
            ))),
        }
    }

    /// Decode one frame if `data` holds a complete one, `None` otherwise.
    pub fn try_decode(&self, data: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(content_len) = read_prefix(data)? else {
            return Ok(None);
        };

        let total = PREFIX_SIZE + content_len;
        if data.len() < total {
            return Ok(None);
        }

        let flags = FrameFlags::from_byte(data[PREFIX_SIZE]);
        let body = &data[FRAME_HEADER_SIZE..total];

        let payload = if flags.is_compressed() {
            lz4_flex::decompress_size_prepended(body).map_err(|e| {
                ProtocolError::Deserialization(format!("failed to decompress payload: {}", e))
            })?
        } else {
            body.to_vec()
        };

        Ok(Some((Frame::new(payload), total)))
    }
}

/// Validate the magic and length prefix, returning the content length once
/// enough bytes for a full header are present.
fn read_prefix(data: &[u8]) -> Result<Option<usize>> {
    if data.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let magic = [data[0], data[1], data[2], data[3]];
    if magic != FRAME_MAGIC {
        return Err(ProtocolError::InvalidFrameMagic {
            expected: u32::from_be_bytes(FRAME_MAGIC),
            got: u32::from_be_bytes(magic),
        });
    }

    let content_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    if PREFIX_SIZE + content_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: PREFIX_SIZE + content_len,
            max: MAX_FRAME_SIZE,
        });
    }
    if content_len == 0 {
        return Err(ProtocolError::Deserialization(
            "invalid frame: content length must include the flags byte".to_string(),
        ));
    }

    Ok(Some(content_len))
}
