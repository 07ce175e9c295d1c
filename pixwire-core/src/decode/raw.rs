use crate::decode::FrameDecode;
use crate::decode::types::{DecodedView, Resolution, swap_rgb565};
use crate::display::ensure_capacity;
use crate::error::PipelineError;
use crate::header::FrameKind;

/// Uncompressed big-endian RGB565 at a fixed resolution.
#[derive(Debug)]
pub struct RawDecoder {
    resolution: Resolution,
    out: Vec<u8>,
}

impl RawDecoder {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            out: Vec::new(),
        }
    }
}

impl FrameDecode for RawDecoder {
    fn kind(&self) -> FrameKind {
        FrameKind::Raw
    }

    fn decode(&mut self, payload: &[u8]) -> Result<DecodedView<'_>, PipelineError> {
        let expected = self.resolution.frame_size();
        if payload.len() != expected {
            return Err(PipelineError::SizeMismatch {
                kind: FrameKind::Raw,
                expected,
                actual: payload.len(),
            });
        }

        ensure_capacity(&mut self.out, expected)?;
        self.out.clear();
        self.out.extend_from_slice(payload);
        swap_rgb565(&mut self.out);

        Ok(DecodedView {
            width: self.resolution.width,
            height: self.resolution.height,
            pixels: &self.out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_each_pixel() {
        let mut decoder = RawDecoder::new(Resolution::new(2, 1));
        let view = decoder.decode(&[0x12, 0x34, 0xAB, 0xCD]).unwrap();
        assert_eq!(view.pixels, &[0x34, 0x12, 0xCD, 0xAB]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut decoder = RawDecoder::new(Resolution::new(2, 2));
        let err = decoder.decode(&[0u8; 7]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SizeMismatch { kind: FrameKind::Raw, expected: 8, actual: 7 }
        ));
    }
}
