//! The assembled receive pipeline.
//!
//! ```text
//!   TCP ─▶ StreamAccumulator ─▶ ModeController ─▶ DecodeService ─▶ DisplayQueue
//!          (per connection)     (async mutex)     (blocking pool)   (drop-oldest)
//! ```
//!
//! [`Pipeline`] owns every stage. The listener can be started and stopped
//! independently of the decode mode; [`Pipeline::shutdown`] tears down in
//! order: listener, decode service, display queue.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::codec::FramingConfig;
use crate::controller::{ModeController, ModeProvider};
use crate::decode::{DecodeConfig, PublishedFrame};
use crate::display::{DEFAULT_QUEUE_CAPACITY, DisplayQueue, FramePool};
use crate::error::PipelineError;
use crate::header::FrameKind;
use crate::network::StreamServer;
use crate::stats::{PipelineStats, StatsSnapshot};

// ── PipelineConfig ───────────────────────────────────────────────

/// Tunables for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub framing: FramingConfig,
    pub decode: DecodeConfig,
    /// Frames held by the display queue before the oldest is evicted.
    pub queue_capacity: usize,
    /// Released pixel buffers kept for reuse.
    pub pool_max_idle: usize,
    /// Consecutive frames of a new kind needed to switch decode mode.
    /// `1` switches on the first frame.
    pub mode_switch_debounce: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            framing: FramingConfig::default(),
            decode: DecodeConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pool_max_idle: DEFAULT_QUEUE_CAPACITY + 2,
            mode_switch_debounce: 2,
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<DisplayQueue>,
    stats: Arc<PipelineStats>,
    controller: Arc<Mutex<ModeController>>,
    server: Option<StreamServer>,
}

impl Pipeline {
    /// Build the pipeline and start the decode service for the provider's
    /// configured mode.
    pub async fn new(
        config: PipelineConfig,
        provider: &dyn ModeProvider,
    ) -> Result<Self, PipelineError> {
        let queue = Arc::new(DisplayQueue::new(config.queue_capacity));
        let stats = Arc::new(PipelineStats::new());

        let initial = provider.configured_mode();
        let mut controller = ModeController::new(
            initial,
            Arc::clone(&queue),
            FramePool::new(config.pool_max_idle),
            config.decode.clone(),
            Arc::clone(&stats),
            config.mode_switch_debounce,
        );
        controller.set_mode(initial).await?;
        info!("pipeline ready in {initial} mode");

        Ok(Self {
            config,
            queue,
            stats,
            controller: Arc::new(Mutex::new(controller)),
            server: None,
        })
    }

    /// Start accepting clients on `addr`. Returns the bound address; a
    /// second call while listening returns the existing one.
    pub async fn start_listener(&mut self, addr: &str) -> Result<SocketAddr, PipelineError> {
        if let Some(server) = self.server.as_ref().filter(|s| s.is_running()) {
            return Ok(server.local_addr());
        }
        let server = StreamServer::bind(
            addr,
            self.config.framing.clone(),
            Arc::clone(&self.controller),
            Arc::clone(&self.stats),
        )
        .await?;
        let local = server.local_addr();
        self.server = Some(server);
        Ok(local)
    }

    pub async fn stop_listener(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.server.as_ref().is_some_and(StreamServer::is_running)
    }

    pub fn is_connected(&self) -> bool {
        self.server.as_ref().is_some_and(StreamServer::is_connected)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(StreamServer::local_addr)
    }

    pub async fn set_mode(&self, kind: FrameKind) -> Result<(), PipelineError> {
        self.controller.lock().await.set_mode(kind).await
    }

    pub async fn current_mode(&self) -> FrameKind {
        self.controller.lock().await.current_mode()
    }

    /// Latest frame of the active decode service.
    pub async fn peek_latest(&self) -> Option<Arc<PublishedFrame>> {
        self.controller.lock().await.peek_latest()
    }

    /// The render consumer's end of the pipeline.
    pub fn display_queue(&self) -> Arc<DisplayQueue> {
        Arc::clone(&self.queue)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop the listener, then the decode service, then close the queue.
    pub async fn shutdown(mut self) {
        self.stop_listener().await;
        self.controller.lock().await.shutdown().await;
        self.queue.close();
        info!("pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.mode_switch_debounce, 2);
        assert_eq!(config.framing.accumulator_capacity, 100 * 1024);
        assert_eq!(config.decode.lz4_resolution.width, 240);
        assert_eq!(config.decode.lz4_resolution.height, 180);
    }

    #[tokio::test]
    async fn starts_in_configured_mode() {
        let pipeline = Pipeline::new(PipelineConfig::default(), &FrameKind::Lz4)
            .await
            .unwrap();
        assert_eq!(pipeline.current_mode().await, FrameKind::Lz4);
        assert!(!pipeline.is_listening());
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn listener_restarts_independently_of_mode() {
        let mut pipeline = Pipeline::new(PipelineConfig::default(), &FrameKind::Jpeg)
            .await
            .unwrap();

        let addr = pipeline.start_listener("127.0.0.1:0").await.unwrap();
        assert_eq!(pipeline.start_listener("127.0.0.1:0").await.unwrap(), addr);
        assert!(pipeline.is_listening());

        pipeline.stop_listener().await;
        assert!(!pipeline.is_listening());
        assert_eq!(pipeline.current_mode().await, FrameKind::Jpeg);

        pipeline.set_mode(FrameKind::Raw).await.unwrap();
        pipeline.start_listener("127.0.0.1:0").await.unwrap();
        assert!(pipeline.is_listening());

        let queue = pipeline.display_queue();
        pipeline.shutdown().await;
        assert!(queue.is_closed());
    }
}
