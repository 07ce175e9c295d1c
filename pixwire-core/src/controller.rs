//! Decode-mode selection.
//!
//! The controller owns at most one [`DecodeService`] and routes each frame
//! to it. A frame of a different kind starts a mode switch, debounced over
//! `mode_switch_debounce` consecutive frames:
//!
//! ```text
//!   mode = JPEG, debounce = 2
//!
//!   JPEG ─▶ decoded by JPEG
//!   LZ4  ─▶ dropped (pending LZ4 x1)
//!   JPEG ─▶ decoded by JPEG, pending cleared
//!   LZ4  ─▶ dropped (pending LZ4 x1)
//!   LZ4  ─▶ stop JPEG, start LZ4, decoded by LZ4
//! ```
//!
//! A frame is only ever handed to the service of its own kind.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::decode::{DecodeConfig, DecodeService, PublishedFrame, decoder_for};
use crate::display::{DisplayQueue, FramePool};
use crate::error::PipelineError;
use crate::header::FrameKind;
use crate::stats::PipelineStats;

/// Source of the decode mode to start in.
pub trait ModeProvider: Send + Sync {
    fn configured_mode(&self) -> FrameKind;
}

impl ModeProvider for FrameKind {
    fn configured_mode(&self) -> FrameKind {
        *self
    }
}

/// Owns the active decode service and switches it on kind changes.
#[derive(Debug)]
pub struct ModeController {
    service: Option<DecodeService>,
    mode: FrameKind,
    queue: Arc<DisplayQueue>,
    pool: FramePool,
    config: DecodeConfig,
    stats: Arc<PipelineStats>,
    debounce: u32,
    /// Kind waiting to take over and how many consecutive frames of it
    /// have been seen.
    pending: Option<(FrameKind, u32)>,
}

impl ModeController {
    /// A controller in `initial` mode. No service runs until
    /// [`set_mode`](Self::set_mode) or the first routed frame.
    pub fn new(
        initial: FrameKind,
        queue: Arc<DisplayQueue>,
        pool: FramePool,
        config: DecodeConfig,
        stats: Arc<PipelineStats>,
        debounce: u32,
    ) -> Self {
        Self {
            service: None,
            mode: initial,
            queue,
            pool,
            config,
            stats,
            debounce: debounce.max(1),
            pending: None,
        }
    }

    pub fn current_mode(&self) -> FrameKind {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.service.as_ref().is_some_and(DecodeService::is_running)
    }

    /// Make `kind` the active mode, restarting the service if needed.
    ///
    /// The old service is fully stopped (worker joined, buffers freed)
    /// before the new one starts. Setting the current mode again is a
    /// no-op while its service is running.
    pub async fn set_mode(&mut self, kind: FrameKind) -> Result<(), PipelineError> {
        self.pending = None;
        if self.mode == kind && self.is_active() {
            return Ok(());
        }

        let previous = self.mode;
        let switching = self.service.is_some() && previous != kind;
        if let Some(mut old) = self.service.take() {
            old.stop().await;
        }

        self.mode = kind;
        let service = DecodeService::start(
            decoder_for(kind, &self.config),
            Arc::clone(&self.queue),
            self.pool.clone(),
            Arc::clone(&self.stats),
            self.config.worker_queue_depth,
        )?;
        self.service = Some(service);

        if switching {
            self.stats.record_mode_switch();
            info!("decode mode switched: {previous} -> {kind}");
        }
        Ok(())
    }

    /// Route one frame payload.
    ///
    /// Returns `true` if the payload was handed to a decode worker.
    pub async fn route(&mut self, kind: FrameKind, payload: Bytes) -> Result<bool, PipelineError> {
        if kind == self.mode {
            self.pending = None;
            if !self.is_active() {
                self.set_mode(kind).await?;
            }
            return Ok(self.dispatch(payload));
        }

        let seen = match self.pending {
            Some((pending, n)) if pending == kind => n + 1,
            _ => 1,
        };

        if seen >= self.debounce {
            info!("{kind} data received while in {} mode, switching", self.mode);
            self.set_mode(kind).await?;
            return Ok(self.dispatch(payload));
        }

        self.pending = Some((kind, seen));
        self.stats.record_mismatched_drop();
        debug!(
            "dropping {kind} frame in {} mode ({seen}/{} before switch)",
            self.mode, self.debounce
        );
        Ok(false)
    }

    fn dispatch(&self, payload: Bytes) -> bool {
        self.service
            .as_ref()
            .is_some_and(|svc| svc.process(payload))
    }

    /// Latest frame published by the active service.
    pub fn peek_latest(&self) -> Option<Arc<PublishedFrame>> {
        self.service.as_ref().and_then(DecodeService::peek_latest)
    }

    /// Stop the active service, if any.
    pub async fn shutdown(&mut self) {
        self.pending = None;
        if let Some(mut svc) = self.service.take() {
            svc.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::decode::Resolution;

    fn config() -> DecodeConfig {
        DecodeConfig {
            lz4_resolution: Resolution::new(2, 1),
            raw_resolution: Resolution::new(2, 1),
            worker_queue_depth: 8,
        }
    }

    fn controller(initial: FrameKind, debounce: u32) -> (ModeController, Arc<DisplayQueue>, Arc<PipelineStats>) {
        let queue = Arc::new(DisplayQueue::new(16));
        let stats = Arc::new(PipelineStats::new());
        let ctl = ModeController::new(
            initial,
            Arc::clone(&queue),
            FramePool::new(4),
            config(),
            Arc::clone(&stats),
            debounce,
        );
        (ctl, queue, stats)
    }

    fn lz4_payload(raw: &[u8]) -> Bytes {
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(raw).unwrap();
        Bytes::from(enc.finish().unwrap())
    }

    fn drain_kinds(queue: &DisplayQueue) -> Vec<FrameKind> {
        std::iter::from_fn(|| queue.try_dequeue()).map(|f| f.kind).collect()
    }

    #[tokio::test]
    async fn set_mode_starts_and_replaces_service() {
        let (mut ctl, _queue, stats) = controller(FrameKind::Jpeg, 2);
        assert!(!ctl.is_active());

        ctl.set_mode(FrameKind::Jpeg).await.unwrap();
        assert!(ctl.is_active());
        assert_eq!(stats.snapshot().mode_switches, 0);

        ctl.set_mode(FrameKind::Raw).await.unwrap();
        assert_eq!(ctl.current_mode(), FrameKind::Raw);
        assert!(ctl.is_active());
        assert_eq!(stats.snapshot().mode_switches, 1);

        ctl.shutdown().await;
        assert!(!ctl.is_active());
    }

    #[tokio::test]
    async fn debounced_switch_drops_first_mismatch() {
        let (mut ctl, queue, stats) = controller(FrameKind::Raw, 2);
        ctl.set_mode(FrameKind::Raw).await.unwrap();

        let raw = Bytes::from_static(&[0, 1, 0, 2]);
        assert!(ctl.route(FrameKind::Raw, raw.clone()).await.unwrap());

        let lz4 = lz4_payload(&[0, 3, 0, 4]);
        assert!(!ctl.route(FrameKind::Lz4, lz4.clone()).await.unwrap());
        assert_eq!(ctl.current_mode(), FrameKind::Raw);

        assert!(ctl.route(FrameKind::Lz4, lz4).await.unwrap());
        assert_eq!(ctl.current_mode(), FrameKind::Lz4);
        ctl.shutdown().await;

        assert_eq!(drain_kinds(&queue), vec![FrameKind::Raw, FrameKind::Lz4]);
        let snap = stats.snapshot();
        assert_eq!(snap.mismatched_drops, 1);
        assert_eq!(snap.mode_switches, 1);
        assert_eq!(snap.decode_errors, 0);
    }

    #[tokio::test]
    async fn interleaved_kind_resets_debounce() {
        let (mut ctl, _queue, stats) = controller(FrameKind::Raw, 2);
        let raw = Bytes::from_static(&[0, 1, 0, 2]);
        let lz4 = lz4_payload(&[0, 3, 0, 4]);

        for _ in 0..3 {
            ctl.route(FrameKind::Lz4, lz4.clone()).await.unwrap();
            ctl.route(FrameKind::Raw, raw.clone()).await.unwrap();
        }
        assert_eq!(ctl.current_mode(), FrameKind::Raw);
        assert_eq!(stats.snapshot().mismatched_drops, 3);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn debounce_of_one_switches_immediately() {
        let (mut ctl, queue, stats) = controller(FrameKind::Jpeg, 1);
        ctl.set_mode(FrameKind::Jpeg).await.unwrap();

        let raw = Bytes::from_static(&[0xF8, 0x00, 0x07, 0xE0]);
        assert!(ctl.route(FrameKind::Raw, raw).await.unwrap());
        assert_eq!(ctl.current_mode(), FrameKind::Raw);
        ctl.shutdown().await;

        assert_eq!(drain_kinds(&queue), vec![FrameKind::Raw]);
        assert_eq!(stats.snapshot().mismatched_drops, 0);
    }

    #[tokio::test]
    async fn payloads_never_reach_a_foreign_decoder() {
        let (mut ctl, queue, stats) = controller(FrameKind::Raw, 3);
        ctl.set_mode(FrameKind::Raw).await.unwrap();

        // RAW-sized bytes labelled LZ4 would decode fine as RAW; they must
        // be dropped, not decoded.
        for _ in 0..2 {
            let routed = ctl
                .route(FrameKind::Lz4, Bytes::from_static(&[1, 2, 3, 4]))
                .await
                .unwrap();
            assert!(!routed);
        }
        ctl.shutdown().await;

        assert!(queue.is_empty());
        assert_eq!(stats.snapshot().frames_decoded, 0);
        assert_eq!(stats.snapshot().mismatched_drops, 2);
    }

    #[tokio::test]
    async fn first_routed_frame_starts_service() {
        let (mut ctl, queue, _stats) = controller(FrameKind::Raw, 2);
        assert!(ctl.route(FrameKind::Raw, Bytes::from_static(&[0, 0, 0, 0])).await.unwrap());
        ctl.shutdown().await;
        assert_eq!(queue.len(), 1);
    }
}
