//! # pixwire-core
//!
//! Receive side of a streamed-image link: a TCP byte stream in, display-ready
//! RGB565 frames out.
//!
//! This crate contains:
//! - **Header / Frame**: the 9-byte wire header and `WireFrame`
//! - **Codec**: `FrameCodec` and `StreamAccumulator`, framing with sync-word resynchronisation
//! - **Decode**: JPEG, LZ4 and RAW decoders, each run by a `DecodeService` worker
//! - **Display**: `FramePool`, `FrameDescriptor` and the drop-oldest `DisplayQueue`
//! - **Controller**: `ModeController`, switching decode mode on data-type changes
//! - **Network**: `StreamServer`, a single-client TCP listener
//! - **Pipeline**: `Pipeline`, which wires the stages together
//! - **Error / Stats**: `PipelineError` and shared `PipelineStats` counters

pub mod codec;
pub mod controller;
pub mod decode;
pub mod display;
pub mod error;
pub mod frame;
pub mod header;
pub mod network;
pub mod pipeline;
pub mod stats;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_ACCUMULATOR_CAPACITY, FrameCodec, FramingConfig, StreamAccumulator};
pub use controller::{ModeController, ModeProvider};
pub use decode::{
    DecodeConfig, DecodeService, DecodedView, FrameDecode, JpegDecoder, Lz4Decoder,
    PublishedFrame, RawDecoder, Resolution, ServiceState, TripleBuffer,
};
pub use display::{DisplayQueue, FrameDescriptor, FramePool, PixelBuffer, PoolStats};
pub use error::PipelineError;
pub use frame::WireFrame;
pub use header::{FrameHeader, FrameKind, HEADER_SIZE, SYNC_WORD};
pub use network::{DEFAULT_PORT, StreamServer};
pub use pipeline::{Pipeline, PipelineConfig};
pub use stats::{PipelineStats, StatsSnapshot};
