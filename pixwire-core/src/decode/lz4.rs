use std::io::Read;

use lz4_flex::frame::FrameDecoder;
use tracing::trace;

use crate::decode::FrameDecode;
use crate::decode::types::{DecodedView, Resolution, swap_rgb565};
use crate::display::ensure_capacity;
use crate::error::PipelineError;
use crate::header::FrameKind;

/// Magic number opening every LZ4 frame.
pub const LZ4_FRAME_MAGIC: u32 = 0x184D_2204;

/// LZ4 frame of big-endian RGB565 at a fixed resolution, to RGB565 LE.
///
/// The decompressed size must match the resolution exactly.
#[derive(Debug)]
pub struct Lz4Decoder {
    resolution: Resolution,
    out: Vec<u8>,
}

impl Lz4Decoder {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            out: Vec::new(),
        }
    }
}

impl FrameDecode for Lz4Decoder {
    fn kind(&self) -> FrameKind {
        FrameKind::Lz4
    }

    fn decode(&mut self, payload: &[u8]) -> Result<DecodedView<'_>, PipelineError> {
        let magic = payload
            .get(..4)
            .map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]]));
        if magic != Some(LZ4_FRAME_MAGIC) {
            return Err(PipelineError::decode(FrameKind::Lz4, "bad frame magic"));
        }

        let expected = self.resolution.frame_size();
        ensure_capacity(&mut self.out, expected)?;
        self.out.clear();

        // One byte past the expected size is enough to detect oversized output.
        FrameDecoder::new(payload)
            .take(expected as u64 + 1)
            .read_to_end(&mut self.out)
            .map_err(|e| PipelineError::decode(FrameKind::Lz4, e.to_string()))?;

        if self.out.len() != expected {
            return Err(PipelineError::SizeMismatch {
                kind: FrameKind::Lz4,
                expected,
                actual: self.out.len(),
            });
        }

        swap_rgb565(&mut self.out);
        trace!("decompressed LZ4 {} -> {} bytes", payload.len(), expected);
        Ok(DecodedView {
            width: self.resolution.width,
            height: self.resolution.height,
            pixels: &self.out,
        })
    }
}
