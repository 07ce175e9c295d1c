//! Wire header for the image stream.
//!
//! ## Wire format
//!
//! ```text
//! sync_word:  u32  (4)   0xAEBC1402, little-endian
//! data_type:  u8   (1)   0x01 JPEG, 0x02 LZ4, 0x03 RAW
//! data_len:   u32  (4)   payload length in bytes
//! payload:    [u8] (data_len)
//! ```
//!
//! The header is packed: there is no padding between fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Magic value that opens every frame header.
pub const SYNC_WORD: u32 = 0xAEBC_1402;

/// [`SYNC_WORD`] as it appears on the wire.
pub const SYNC_BYTES: [u8; 4] = SYNC_WORD.to_le_bytes();

/// Encoded header size on the wire.
pub const HEADER_SIZE: usize = 9;

// ── FrameKind ────────────────────────────────────────────────────

/// Payload format carried by a frame; also the decode mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FrameKind {
    /// Baseline JPEG image.
    Jpeg = 0x01,
    /// LZ4 frame wrapping big-endian RGB565 pixels.
    Lz4 = 0x02,
    /// Uncompressed big-endian RGB565 pixels.
    Raw = 0x03,
}

impl FrameKind {
    /// All kinds, in wire order.
    pub const ALL: [FrameKind; 3] = [FrameKind::Jpeg, FrameKind::Lz4, FrameKind::Raw];

    /// The `data_type` byte for this kind.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Jpeg),
            0x02 => Ok(FrameKind::Lz4),
            0x03 => Ok(FrameKind::Raw),
            other => Err(PipelineError::UnknownDataType(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Jpeg => "JPEG",
            FrameKind::Lz4 => "LZ4",
            FrameKind::Raw => "RAW",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FrameKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FrameKind::Jpeg),
            "lz4" => Ok(FrameKind::Lz4),
            "raw" => Ok(FrameKind::Raw),
            other => Err(PipelineError::Other(format!("unknown frame kind: {other}"))),
        }
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// A validated frame header.
///
/// Only headers that carry [`SYNC_WORD`] and a known data type can be
/// constructed through [`decode`](Self::decode), so the sync word itself
/// is not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub data_len: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(kind: FrameKind, data_len: u32) -> Self {
        Self { kind, data_len }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&SYNC_BYTES);
        buf[4] = self.kind.as_byte();
        buf[5..9].copy_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    ///
    /// Returns `Ok(None)` when `data` does not start with the sync word, so
    /// callers can tell "not a header here" apart from "a header with a bad
    /// field".
    pub fn decode(data: &[u8]) -> Result<Option<Self>, PipelineError> {
        if data.len() < Self::SIZE || !starts_with_sync(data) {
            return Ok(None);
        }
        let kind = FrameKind::try_from(data[4])?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&data[5..9]);
        Ok(Some(Self {
            kind,
            data_len: u32::from_le_bytes(len),
        }))
    }

    /// Header plus payload size.
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.data_len as usize
    }
}

/// Whether `data` begins with [`SYNC_BYTES`].
pub fn starts_with_sync(data: &[u8]) -> bool {
    data.len() >= SYNC_BYTES.len() && data[..SYNC_BYTES.len()] == SYNC_BYTES
}

/// Offset of the first sync word in `data`, scanning byte by byte.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    data.windows(SYNC_BYTES.len()).position(|w| w == SYNC_BYTES)
}
