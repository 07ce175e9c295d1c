//! Hand-off between decode workers and the render consumer.
//!
//! ```text
//!  decode worker ──copy──▶ PixelBuffer ──▶ DisplayQueue ──▶ render loop
//!        ▲                  (from pool)    (drop-oldest)        │
//!        └──────────────────── FramePool ◀──────── drop ────────┘
//! ```
//!
//! A [`FrameDescriptor`] owns its [`PixelBuffer`], so exactly one party
//! holds a frame at any time. Freeing a frame is dropping it.

mod pool;
mod queue;

pub use pool::{FramePool, PixelBuffer, PoolStats, ensure_capacity};
pub use queue::{DEFAULT_QUEUE_CAPACITY, DisplayQueue};

use crate::header::FrameKind;

/// A decoded frame travelling through the display queue.
#[derive(Debug)]
pub struct FrameDescriptor {
    pub kind: FrameKind,
    pub width: u32,
    pub height: u32,
    /// Size of the wire payload this frame was decoded from.
    pub payload_len: usize,
    buffer: PixelBuffer,
}

impl FrameDescriptor {
    pub fn new(
        kind: FrameKind,
        width: u32,
        height: u32,
        payload_len: usize,
        buffer: PixelBuffer,
    ) -> Self {
        Self {
            kind,
            width,
            height,
            payload_len,
            buffer,
        }
    }

    /// RGB565 little-endian pixels, `width * height * 2` bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }
}
