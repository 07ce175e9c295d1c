use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{error, warn};

use crate::codec::FrameCodec;
use crate::frame::WireFrame;
use crate::header::HEADER_SIZE;
use crate::stats::PipelineStats;

/// Bounded byte buffer that turns arbitrary socket reads into frames.
///
/// The buffer never holds more than `capacity` bytes: input is appended in
/// slices that fit, and frames are extracted (and compacted out) between
/// slices. Since the codec rejects any header whose frame would not fit,
/// a full buffer always contains a complete frame; should it ever not, the
/// oldest byte is evicted so the parser keeps moving.
#[derive(Debug)]
pub struct StreamAccumulator {
    buf: BytesMut,
    codec: FrameCodec,
    capacity: usize,
}

impl StreamAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self::with_stats(capacity, Arc::new(PipelineStats::new()))
    }

    pub fn with_stats(capacity: usize, stats: Arc<PipelineStats>) -> Self {
        let capacity = capacity.max(HEADER_SIZE + 1);
        Self {
            buf: BytesMut::with_capacity(capacity),
            codec: FrameCodec::with_stats(capacity - HEADER_SIZE, stats),
            capacity,
        }
    }

    /// Append `data` and return every frame it completes, in stream order.
    pub fn feed(&mut self, mut data: &[u8]) -> Vec<WireFrame> {
        let mut frames = Vec::new();

        while !data.is_empty() {
            if self.buf.len() >= self.capacity {
                warn!("accumulator full without a frame, evicting oldest byte");
                self.buf.advance(1);
                self.codec.stats().record_discard(1);
            }

            let take = (self.capacity - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];

            self.drain_frames(&mut frames);
        }

        frames
    }

    fn drain_frames(&mut self, frames: &mut Vec<WireFrame>) {
        loop {
            match self.codec.decode(&mut self.buf) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    error!("framing error, clearing accumulator: {e}");
                    self.reset();
                    break;
                }
            }
        }
    }

    /// Drop all buffered bytes (e.g. when a connection ends).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        self.codec.stats()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FrameHeader, FrameKind, SYNC_BYTES};

    fn wire(kind: FrameKind, payload: &[u8]) -> Vec<u8> {
        WireFrame::new(kind, payload.to_vec()).unwrap().to_bytes().to_vec()
    }

    /// Deterministic filler that never contains the sync word.
    fn garbage(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) & 0x7F)
            .collect()
    }

    fn feed_in_chunks(acc: &mut StreamAccumulator, data: &[u8], chunk: usize) -> Vec<WireFrame> {
        data.chunks(chunk).flat_map(|c| acc.feed(c)).collect()
    }

    #[test]
    fn interleaved_garbage_yields_frames_in_order() {
        let payloads: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 10 + i as usize * 7]).collect();
        let kinds = [FrameKind::Jpeg, FrameKind::Lz4, FrameKind::Raw];

        let mut stream = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            stream.extend_from_slice(&garbage(i * 5 + 1, i as u8));
            stream.extend_from_slice(&wire(kinds[i % 3], p));
        }
        stream.extend_from_slice(&garbage(11, 99));

        for chunk in [1, 2, 3, 5, 8, 13, 64, stream.len()] {
            let mut acc = StreamAccumulator::new(1024);
            let frames = feed_in_chunks(&mut acc, &stream, chunk);
            assert_eq!(frames.len(), payloads.len(), "chunk size {chunk}");
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame.kind(), kinds[i % 3], "chunk size {chunk}");
                assert_eq!(frame.payload(), &payloads[i][..], "chunk size {chunk}");
            }
        }
    }

    #[test]
    fn garbage_only_stream_stays_bounded() {
        let mut acc = StreamAccumulator::new(256);
        for round in 0..200u8 {
            let frames = acc.feed(&garbage(97, round));
            assert!(frames.is_empty());
            assert!(acc.len() <= acc.capacity());
            assert!(acc.len() < HEADER_SIZE);
        }
        assert!(acc.stats().snapshot().bytes_discarded > 0);
    }

    #[test]
    fn single_read_larger_than_capacity_is_processed() {
        let mut stream = Vec::new();
        for i in 0..20u8 {
            stream.extend_from_slice(&wire(FrameKind::Raw, &[i; 40]));
        }
        let mut acc = StreamAccumulator::new(64);
        let frames = acc.feed(&stream);
        assert_eq!(frames.len(), 20);
        assert!(acc.is_empty());
    }

    #[test]
    fn garbage_then_jpeg_split_anywhere() {
        let payload: Vec<u8> = (0..50u8).collect();
        let mut stream = garbage(7, 3);
        stream.extend_from_slice(&wire(FrameKind::Jpeg, &payload));

        for split in 0..=stream.len() {
            let mut acc = StreamAccumulator::new(1024);
            let mut frames = acc.feed(&stream[..split]);
            frames.extend(acc.feed(&stream[split..]));

            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].kind(), FrameKind::Jpeg);
            assert_eq!(frames[0].payload(), &payload[..]);
            assert!(acc.is_empty());
        }
    }

    #[test]
    fn sync_word_inside_payload_is_not_a_header() {
        // The first payload carries a complete, plausible header.
        let mut inner = vec![0xEE; 4];
        inner.extend_from_slice(&wire(FrameKind::Lz4, b"fake"));
        inner.extend_from_slice(&[0xEE; 4]);

        let mut stream = wire(FrameKind::Jpeg, &inner);
        stream.extend_from_slice(&wire(FrameKind::Jpeg, b"next"));

        for chunk in [1, 4, 9, stream.len()] {
            let mut acc = StreamAccumulator::new(1024);
            let frames = feed_in_chunks(&mut acc, &stream, chunk);
            assert_eq!(frames.len(), 2, "chunk size {chunk}");
            assert_eq!(frames[0].payload(), &inner[..]);
            assert_eq!(frames[1].payload(), b"next");
            assert_eq!(acc.stats().snapshot().resync_events, 0);
        }
    }

    #[test]
    fn corrupted_second_header_recovers_on_later_sync() {
        let mut stream = wire(FrameKind::Jpeg, b"first");
        let mut second = wire(FrameKind::Jpeg, b"lost-payload");
        second[0] = 0x00;
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&wire(FrameKind::Raw, b"third"));

        let mut acc = StreamAccumulator::new(1024);
        let frames = feed_in_chunks(&mut acc, &stream, 3);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(frames[1].payload(), b"third");
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut acc = StreamAccumulator::new(1024);
        let bytes = wire(FrameKind::Jpeg, &[1u8; 30]);
        assert!(acc.feed(&bytes[..15]).is_empty());
        acc.reset();
        assert!(acc.feed(&bytes[15..]).is_empty());

        let mut tail = SYNC_BYTES.to_vec();
        tail.extend_from_slice(&[FrameKind::Raw.as_byte(), 0, 0, 0, 0]);
        let frames = acc.feed(&tail);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header(), &FrameHeader::new(FrameKind::Raw, 0));
    }
}
