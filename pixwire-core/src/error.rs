//! Domain-specific error types for the image pipeline.
//!
//! Framing corruption never surfaces here: the codec resynchronises
//! silently and only counts the event. What remains are decode failures
//! (which drop a single frame), transport failures (which end a single
//! connection) and setup failures (which are returned to the caller).

use std::path::PathBuf;

use thiserror::Error;

use crate::header::FrameKind;

/// The canonical error type for the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Wire Errors ──────────────────────────────────────────────
    /// A `data_type` byte did not map to a known frame kind.
    #[error("unknown data type: {0:#04x}")]
    UnknownDataType(u8),

    /// The payload exceeds what the wire format or accumulator can carry.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Decode Errors ────────────────────────────────────────────
    /// A payload could not be turned into pixels.
    #[error("{kind} decode failed: {reason}")]
    Decode { kind: FrameKind, reason: String },

    /// The decoded image does not match the size the service expects.
    #[error("unexpected {kind} output size: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },

    /// A frame buffer could not be grown.
    #[error("failed to allocate {size} byte frame buffer")]
    Allocation { size: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The listener could not be bound to its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── File Errors ──────────────────────────────────────────────
    /// A local file or directory could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Wrap a file-system error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a [`PipelineError::Decode`].
    pub fn decode(kind: FrameKind, reason: impl Into<String>) -> Self {
        PipelineError::Decode {
            kind,
            reason: reason.into(),
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for PipelineError {
    fn from(s: String) -> Self {
        PipelineError::Other(s)
    }
}

impl From<&str> for PipelineError {
    fn from(s: &str) -> Self {
        PipelineError::Other(s.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        PipelineError::decode(FrameKind::Jpeg, e.to_string())
    }
}

impl From<lz4_flex::frame::Error> for PipelineError {
    fn from(e: lz4_flex::frame::Error) -> Self {
        PipelineError::decode(FrameKind::Lz4, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PipelineError::UnknownDataType(0x7f);
        assert!(e.to_string().contains("0x7f"));

        let e = PipelineError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = PipelineError::decode(FrameKind::Lz4, "truncated");
        assert_eq!(e.to_string(), "LZ4 decode failed: truncated");

        let e = PipelineError::io(
            "frames/a.jpg",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(e.to_string(), "failed to read frames/a.jpg: gone");
    }

    #[test]
    fn from_string() {
        let e: PipelineError = "something broke".into();
        assert!(matches!(e, PipelineError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PipelineError = io_err.into();
        assert!(matches!(e, PipelineError::Connection(_)));
    }
}
