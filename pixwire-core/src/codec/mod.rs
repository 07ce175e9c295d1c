//! Stream framing with resynchronisation.
//!
//! [`FrameCodec`] is a `tokio_util` codec that never fails on bad input:
//! when the bytes at the head of the buffer are not a valid header it
//! scans forward byte by byte for the next sync word and drops whatever
//! precedes it. [`StreamAccumulator`] wraps the codec with a hard capacity
//! for callers that push raw socket reads.

mod accumulator;

pub use accumulator::StreamAccumulator;

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::PipelineError;
use crate::frame::WireFrame;
use crate::header::{FrameHeader, HEADER_SIZE, SYNC_BYTES, find_sync};
use crate::stats::PipelineStats;

/// Default accumulator capacity (100 KiB).
pub const DEFAULT_ACCUMULATOR_CAPACITY: usize = 100 * 1024;

/// Bytes kept after a failed sync search, in case the sync word is split
/// across two reads.
const SYNC_TAIL: usize = SYNC_BYTES.len() - 1;

// ── FramingConfig ────────────────────────────────────────────────

/// Framing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Maximum bytes buffered between socket reads. Also bounds the largest
    /// acceptable frame (header included).
    pub accumulator_capacity: usize,
    /// Size of a single socket read.
    pub read_chunk_size: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            accumulator_capacity: DEFAULT_ACCUMULATOR_CAPACITY,
            read_chunk_size: 2048,
        }
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Resynchronising codec for the image stream.
#[derive(Debug)]
pub struct FrameCodec {
    max_payload: usize,
    /// Set while searching for a sync word, so a long garbage run counts as
    /// one resync event rather than one per read.
    resyncing: bool,
    stats: Arc<PipelineStats>,
}

impl FrameCodec {
    /// Codec accepting payloads of at most `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self::with_stats(max_payload, Arc::new(PipelineStats::new()))
    }

    pub fn with_stats(max_payload: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            max_payload,
            resyncing: false,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Drop the head of `src` up to the next sync word after offset 0, or
    /// everything but the last few bytes when there is none.
    fn resync(&mut self, src: &mut BytesMut) {
        let discard = match find_sync(&src[1..]) {
            Some(offset) => offset + 1,
            None => src.len().saturating_sub(SYNC_TAIL),
        };
        if discard == 0 {
            return;
        }

        if self.resyncing {
            self.stats.record_discard(discard);
        } else {
            self.resyncing = true;
            self.stats.record_resync(discard);
            warn!("stream out of sync, discarding {discard} bytes");
        }
        trace!("resync advanced {discard} bytes, {} buffered", src.len() - discard);
        src.advance(discard);
    }
}

impl tokio_util::codec::Decoder for FrameCodec {
    type Item = WireFrame;
    type Error = PipelineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let header = match FrameHeader::decode(&src[..HEADER_SIZE]) {
                Ok(Some(header)) => header,
                Ok(None) => {
                    self.resync(src);
                    continue;
                }
                Err(e) => {
                    debug!("rejecting header: {e}");
                    self.resync(src);
                    continue;
                }
            };

            if header.data_len as usize > self.max_payload {
                debug!(
                    "rejecting header: declared {} bytes exceeds {}",
                    header.data_len, self.max_payload
                );
                self.resync(src);
                continue;
            }

            let frame_len = header.frame_len();
            if src.len() < frame_len {
                // Pending: wait for the rest of the payload.
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            let mut frame = src.split_to(frame_len);
            let payload = frame.split_off(HEADER_SIZE).freeze();

            if self.resyncing {
                debug!("resynchronised on {} frame", header.kind);
                self.resyncing = false;
            }
            self.stats.record_frame();
            trace!("frame: {} ({} bytes)", header.kind, header.data_len);
            return Ok(Some(WireFrame::from_parts(header, payload)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!("discarding {} bytes of incomplete frame at eof", buf.len());
                    self.stats.record_discard(buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl tokio_util::codec::Encoder<WireFrame> for FrameCodec {
    type Error = PipelineError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload_len() > self.max_payload {
            return Err(PipelineError::PayloadTooLarge {
                size: item.payload_len(),
                max: self.max_payload,
            });
        }
        dst.reserve(item.header().frame_len());
        dst.extend_from_slice(&item.header().encode());
        dst.extend_from_slice(item.payload());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
