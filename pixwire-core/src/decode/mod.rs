//! Payload decoders and the worker service that drives them.
//!
//! | Kind | Payload                          | Output size            |
//! |------|----------------------------------|------------------------|
//! | JPEG | baseline JPEG                    | from the JPEG header   |
//! | LZ4  | LZ4 frame of RGB565 big-endian   | configured resolution  |
//! | RAW  | RGB565 big-endian                | configured resolution  |
//!
//! Every decoder emits RGB565 little-endian into scratch buffers it owns.

mod jpeg;
mod lz4;
mod raw;
mod service;
mod triple;
pub mod types;

pub use jpeg::{JPEG_EOI, JPEG_SOI, JpegDecoder};
pub use lz4::{LZ4_FRAME_MAGIC, Lz4Decoder};
pub use raw::RawDecoder;
pub use service::{DecodeService, ServiceState};
pub use triple::{PublishedFrame, TripleBuffer};
pub use types::{DecodedView, Resolution};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::header::FrameKind;

/// One payload format's decoder.
///
/// Runs on a blocking worker thread, so implementations may take their
/// time; they must not keep any state that outlives a failed frame.
pub trait FrameDecode: Send + 'static {
    fn kind(&self) -> FrameKind;

    /// Decode `payload` into RGB565 LE.
    fn decode(&mut self, payload: &[u8]) -> Result<DecodedView<'_>, PipelineError>;
}

// ── DecodeConfig ─────────────────────────────────────────────────

/// Decoder and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Resolution assumed for LZ4 payloads.
    pub lz4_resolution: Resolution,
    /// Resolution assumed for RAW payloads.
    pub raw_resolution: Resolution,
    /// Payloads waiting for the worker; beyond this the oldest is dropped.
    pub worker_queue_depth: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            lz4_resolution: Resolution::default(),
            raw_resolution: Resolution::default(),
            worker_queue_depth: 1,
        }
    }
}

/// The decoder for `kind`.
pub fn decoder_for(kind: FrameKind, config: &DecodeConfig) -> Box<dyn FrameDecode> {
    match kind {
        FrameKind::Jpeg => Box::new(JpegDecoder::new()),
        FrameKind::Lz4 => Box::new(Lz4Decoder::new(config.lz4_resolution)),
        FrameKind::Raw => Box::new(RawDecoder::new(config.raw_resolution)),
    }
}
