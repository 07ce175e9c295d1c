use std::io::Cursor;

use image::codecs::jpeg;
use image::{ColorType, ImageDecoder};
use tracing::{trace, warn};

use crate::decode::FrameDecode;
use crate::decode::types::{
    DecodedView, frame_size, luma8_to_rgb565le, rgb888_to_rgb565le,
};
use crate::display::ensure_capacity;
use crate::error::PipelineError;
use crate::header::FrameKind;

/// Start-of-image marker every JPEG payload must open with.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// End-of-image marker; its absence only earns a warning.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Largest image (in pixels) the decoder will allocate for.
pub const MAX_JPEG_PIXELS: u64 = 4096 * 4096;

/// Baseline JPEG to RGB565 LE.
///
/// The header is parsed first to size the scratch buffers, which are kept
/// between frames and only ever grow.
#[derive(Debug, Default)]
pub struct JpegDecoder {
    decoded: Vec<u8>,
    out: Vec<u8>,
}

impl JpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecode for JpegDecoder {
    fn kind(&self) -> FrameKind {
        FrameKind::Jpeg
    }

    fn decode(&mut self, payload: &[u8]) -> Result<DecodedView<'_>, PipelineError> {
        if !payload.starts_with(&JPEG_SOI) {
            return Err(PipelineError::decode(FrameKind::Jpeg, "missing SOI marker"));
        }
        if !payload.ends_with(&JPEG_EOI) {
            warn!("JPEG payload of {} bytes has no EOI marker", payload.len());
        }

        let decoder = jpeg::JpegDecoder::new(Cursor::new(payload))?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();

        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 || pixels > MAX_JPEG_PIXELS {
            return Err(PipelineError::decode(
                FrameKind::Jpeg,
                format!("unsupported dimensions {width}x{height}"),
            ));
        }

        let decoded_len = usize::try_from(decoder.total_bytes())
            .map_err(|_| PipelineError::Allocation { size: usize::MAX })?;
        ensure_capacity(&mut self.decoded, decoded_len)?;
        self.decoded.resize(decoded_len, 0);
        decoder.read_image(&mut self.decoded)?;

        let out_len = frame_size(width, height);
        ensure_capacity(&mut self.out, out_len)?;
        self.out.resize(out_len, 0);

        match color {
            ColorType::Rgb8 => rgb888_to_rgb565le(&self.decoded, &mut self.out),
            ColorType::L8 => luma8_to_rgb565le(&self.decoded, &mut self.out),
            other => {
                return Err(PipelineError::decode(
                    FrameKind::Jpeg,
                    format!("unsupported colour type {other:?}"),
                ));
            }
        }

        trace!("decoded JPEG {width}x{height} ({} bytes in)", payload.len());
        Ok(DecodedView {
            width,
            height,
            pixels: &self.out,
        })
    }
}
