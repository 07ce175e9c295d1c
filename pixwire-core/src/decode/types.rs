//! Pixel helpers shared by the decoders.
//!
//! All decoders produce RGB565 little-endian: 2 bytes per pixel, tightly
//! packed rows, no stride padding.

use serde::{Deserialize, Serialize};

/// Bytes per output pixel.
pub const BYTES_PER_PIXEL: usize = 2;

/// Output size of a `width` x `height` frame.
pub const fn frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

// ── Resolution ───────────────────────────────────────────────────

/// Fixed frame size assumed for payloads that do not carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn frame_size(self) -> usize {
        frame_size(self.width, self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(240, 180)
    }
}

// ── DecodedView ──────────────────────────────────────────────────

/// Borrowed view of a decoder's output, valid until its next `decode`.
#[derive(Debug, Clone, Copy)]
pub struct DecodedView<'a> {
    pub width: u32,
    pub height: u32,
    /// RGB565 LE pixels, exactly `frame_size(width, height)` bytes.
    pub pixels: &'a [u8],
}

// ── Conversions ──────────────────────────────────────────────────

/// Swap the two bytes of every 16-bit pixel in place (RGB565 BE <-> LE).
pub fn swap_rgb565(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.swap(0, 1);
    }
}

/// Pack one 8-bit-per-channel colour into RGB565.
pub const fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Convert tightly packed RGB888 into RGB565 LE. `out` must hold
/// `rgb.len() / 3 * 2` bytes.
pub fn rgb888_to_rgb565le(rgb: &[u8], out: &mut [u8]) {
    for (src, dst) in rgb.chunks_exact(3).zip(out.chunks_exact_mut(BYTES_PER_PIXEL)) {
        dst.copy_from_slice(&pack_rgb565(src[0], src[1], src[2]).to_le_bytes());
    }
}

/// Convert 8-bit greyscale into RGB565 LE. `out` must hold
/// `luma.len() * 2` bytes.
pub fn luma8_to_rgb565le(luma: &[u8], out: &mut [u8]) {
    for (&y, dst) in luma.iter().zip(out.chunks_exact_mut(BYTES_PER_PIXEL)) {
        dst.copy_from_slice(&pack_rgb565(y, y, y).to_le_bytes());
    }
}
