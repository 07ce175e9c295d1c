//! Pipeline counters.
//!
//! Every recoverable failure (resync, dropped frame, decode error) is
//! handled locally and never propagates, so these counters are the only
//! place where repeated trouble becomes visible.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared atomic counters, updated by the network task and decode workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_parsed: AtomicU64,
    resync_events: AtomicU64,
    bytes_discarded: AtomicU64,
    frames_decoded: AtomicU64,
    decode_errors: AtomicU64,
    input_drops: AtomicU64,
    mode_switches: AtomicU64,
    mismatched_drops: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames extracted from the byte stream.
    pub frames_parsed: u64,
    /// Times the parser had to search for a sync word.
    pub resync_events: u64,
    /// Bytes thrown away while resynchronising.
    pub bytes_discarded: u64,
    /// Frames decoded and published.
    pub frames_decoded: u64,
    /// Frames dropped because they failed to decode.
    pub decode_errors: u64,
    /// Payloads dropped because the decode worker was still busy.
    pub input_drops: u64,
    /// Completed decode-mode switches.
    pub mode_switches: u64,
    /// Frames dropped while a mode switch was being debounced.
    pub mismatched_drops: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self, discarded: usize) {
        self.resync_events.fetch_add(1, Ordering::Relaxed);
        self.bytes_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }

    /// Bytes dropped without a new resync event (e.g. trimming to the
    /// split-sync tail or overflow eviction).
    pub fn record_discard(&self, discarded: usize) {
        self.bytes_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }

    pub fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_drop(&self) {
        self.input_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mode_switch(&self) {
        self.mode_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mismatched_drop(&self) {
        self.mismatched_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_parsed: self.frames_parsed.load(Ordering::Relaxed),
            resync_events: self.resync_events.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            input_drops: self.input_drops.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            mismatched_drops: self.mismatched_drops.load(Ordering::Relaxed),
        }
    }
}
