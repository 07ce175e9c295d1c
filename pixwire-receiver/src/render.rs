//! Headless render loop.
//!
//! Stands in for a display: on every tick it takes the newest frame from the
//! display queue, blits it into a fixed-size RGB565 canvas and drops it,
//! which returns the buffer to the pool. Frame statistics are published on
//! a `watch` channel and logged periodically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info};

use pixwire_core::decode::types::BYTES_PER_PIXEL;
use pixwire_core::{DisplayQueue, FrameDescriptor, FrameKind};

use crate::config::RenderConfig;

// ── Canvas ───────────────────────────────────────────────────────

/// Fixed-size RGB565 LE surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy `frame` to the top-left corner, clipped to the canvas.
    pub fn blit(&mut self, frame: &FrameDescriptor) {
        let copy_w = frame.width.min(self.width) as usize * BYTES_PER_PIXEL;
        let copy_h = frame.height.min(self.height) as usize;
        let src_stride = frame.width as usize * BYTES_PER_PIXEL;
        let dst_stride = self.width as usize * BYTES_PER_PIXEL;
        let src = frame.pixels();

        for row in 0..copy_h {
            let s = row * src_stride;
            let d = row * dst_stride;
            let Some(src_row) = src.get(s..s + copy_w) else {
                break;
            };
            self.pixels[d..d + copy_w].copy_from_slice(src_row);
        }
    }
}

// ── RenderStats ──────────────────────────────────────────────────

/// Render-side statistics.
#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    /// Smoothed frames per second actually drawn.
    pub fps: f64,
    /// Frames drawn since start.
    pub frames_rendered: u64,
    /// Kind of the last frame drawn.
    pub last_kind: Option<FrameKind>,
    /// Last frame width.
    pub width: u32,
    /// Last frame height.
    pub height: u32,
}

// ── RenderLoop ───────────────────────────────────────────────────

pub struct RenderLoop {
    queue: Arc<DisplayQueue>,
    canvas: Canvas,
    config: RenderConfig,
    running: Arc<AtomicBool>,
    stats_tx: watch::Sender<RenderStats>,
    stats_rx: watch::Receiver<RenderStats>,
}

impl RenderLoop {
    pub fn new(queue: Arc<DisplayQueue>, config: RenderConfig) -> Self {
        let (stats_tx, stats_rx) = watch::channel(RenderStats::default());
        Self {
            queue,
            canvas: Canvas::new(config.canvas_width, config.canvas_height),
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats_tx,
            stats_rx,
        }
    }

    /// A cloneable stop handle.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats_receiver(&self) -> watch::Receiver<RenderStats> {
        self.stats_rx.clone()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Draw the newest queued frame, if any. Returns whether one was drawn.
    pub fn render_once(&mut self) -> bool {
        let Some(frame) = self.queue.dequeue_latest() else {
            return false;
        };
        self.canvas.blit(&frame);
        debug!(
            "rendered {} frame {}x{} ({} byte payload)",
            frame.kind, frame.width, frame.height, frame.payload_len
        );
        self.stats_tx.send_modify(|s| {
            s.frames_rendered += 1;
            s.last_kind = Some(frame.kind);
            s.width = frame.width;
            s.height = frame.height;
        });
        true
    }

    /// Tick until stopped or the queue is closed.
    pub async fn run(&mut self) {
        self.running.store(true, Ordering::SeqCst);

        let mut tick = tokio::time::interval(Duration::from_millis(self.config.interval_ms.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut fps_samples: Vec<Duration> = Vec::with_capacity(64);
        let mut last_frame_time = Instant::now();
        let stats_every = Duration::from_secs(self.config.stats_interval_secs);
        let mut last_report = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            tick.tick().await;

            if self.render_once() {
                let now = Instant::now();
                fps_samples.push(now.duration_since(last_frame_time));
                last_frame_time = now;
                if fps_samples.len() > 60 {
                    fps_samples.remove(0);
                }
                let avg_secs: f64 = fps_samples.iter().map(Duration::as_secs_f64).sum::<f64>()
                    / fps_samples.len() as f64;
                let fps = if avg_secs > 0.0 { 1.0 / avg_secs } else { 0.0 };
                self.stats_tx.send_modify(|s| s.fps = fps);
            } else if self.queue.is_closed() {
                break;
            }

            if !stats_every.is_zero() && last_report.elapsed() >= stats_every {
                let stats = self.stats_rx.borrow().clone();
                info!(
                    "render: {:.1} fps, {} frames, last {:?} {}x{}, {} evicted, {} skipped",
                    stats.fps,
                    stats.frames_rendered,
                    stats.last_kind,
                    stats.width,
                    stats.height,
                    self.queue.evicted_count(),
                    self.queue.skipped_count(),
                );
                last_report = Instant::now();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("render loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixwire_core::FramePool;

    fn frame(pool: &FramePool, width: u32, height: u32) -> FrameDescriptor {
        // Each pixel holds its (row, column) in its two bytes.
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 2);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[y as u8, x as u8]);
            }
        }
        let len = pixels.len();
        FrameDescriptor::new(FrameKind::Raw, width, height, len, pool.copy_from(&pixels).unwrap())
    }

    fn pixel(canvas: &Canvas, x: u32, y: u32) -> [u8; 2] {
        let i = (y * canvas.width() + x) as usize * 2;
        [canvas.pixels()[i], canvas.pixels()[i + 1]]
    }

    #[test]
    fn blit_clips_large_frame() {
        let pool = FramePool::new(2);
        let mut canvas = Canvas::new(4, 3);
        canvas.blit(&frame(&pool, 6, 5));

        assert_eq!(pixel(&canvas, 0, 0), [0, 0]);
        assert_eq!(pixel(&canvas, 3, 2), [2, 3]);
    }

    #[test]
    fn blit_small_frame_leaves_rest_untouched() {
        let pool = FramePool::new(2);
        let mut canvas = Canvas::new(4, 4);
        canvas.blit(&frame(&pool, 2, 1));

        assert_eq!(pixel(&canvas, 1, 0), [0, 1]);
        assert_eq!(pixel(&canvas, 2, 0), [0, 0]);
        assert_eq!(pixel(&canvas, 0, 1), [0, 0]);
    }

    #[test]
    fn render_once_takes_newest_and_frees_buffers() {
        let pool = FramePool::new(4);
        let queue = Arc::new(DisplayQueue::new(4));
        queue.enqueue(frame(&pool, 2, 2));
        queue.enqueue(frame(&pool, 3, 3));

        let mut render = RenderLoop::new(Arc::clone(&queue), RenderConfig::default());
        assert!(render.render_once());
        assert!(!render.render_once());

        let stats = render.stats_receiver().borrow().clone();
        assert_eq!(stats.frames_rendered, 1);
        assert_eq!((stats.width, stats.height), (3, 3));
        assert_eq!(pool.stats().returned, 2);
    }

    #[tokio::test]
    async fn run_exits_when_queue_closes() {
        let queue = Arc::new(DisplayQueue::new(4));
        let mut render = RenderLoop::new(
            Arc::clone(&queue),
            RenderConfig {
                interval_ms: 1,
                ..RenderConfig::default()
            },
        );
        queue.close();
        tokio::time::timeout(Duration::from_secs(5), render.run())
            .await
            .unwrap();
        assert!(!render.stop_handle().load(Ordering::SeqCst));
    }
}
