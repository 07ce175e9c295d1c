use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::display::FrameDescriptor;

/// Default number of frames the display queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<FrameDescriptor>,
    closed: bool,
}

/// Bounded FIFO between decode workers and the render consumer.
///
/// `enqueue` never blocks: a full queue evicts its oldest frame. Evicted
/// and skipped frames are dropped, which returns their buffers to the
/// pool.
#[derive(Debug)]
pub struct DisplayQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
    evicted: AtomicU64,
    skipped: AtomicU64,
}

impl DisplayQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
            evicted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a frame, evicting the oldest one if the queue is full.
    ///
    /// Returns `false` (and frees the frame) if the queue is closed.
    pub fn enqueue(&self, frame: FrameDescriptor) -> bool {
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                drop(state);
                debug!("display queue closed, dropping {} frame", frame.kind);
                return false;
            }
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(frame);
            evicted
        };
        self.ready.notify_one();

        if let Some(old) = evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            trace!("display queue full, evicted oldest {} frame", old.kind);
        }
        true
    }

    /// Pop the oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or once the queue is closed and empty.
    pub fn dequeue(&self, timeout: Duration) -> Option<FrameDescriptor> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.items.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.items.pop_front()
    }

    pub fn try_dequeue(&self) -> Option<FrameDescriptor> {
        self.lock().items.pop_front()
    }

    /// Drain the queue and return only the newest frame.
    pub fn dequeue_latest(&self) -> Option<FrameDescriptor> {
        let (latest, stale): (FrameDescriptor, Vec<FrameDescriptor>) = {
            let mut state = self.lock();
            let latest = state.items.pop_back()?;
            (latest, state.items.drain(..).collect())
        };
        if !stale.is_empty() {
            self.skipped.fetch_add(stale.len() as u64, Ordering::Relaxed);
        }
        Some(latest)
    }

    /// Release a frame the consumer is done with.
    pub fn free(&self, frame: FrameDescriptor) {
        drop(frame);
    }

    /// Stop accepting frames and free everything still queued.
    pub fn close(&self) {
        let drained: Vec<FrameDescriptor> = {
            let mut state = self.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.ready.notify_all();
        if !drained.is_empty() {
            debug!("display queue closed with {} frames pending", drained.len());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by drop-oldest.
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Frames discarded by [`dequeue_latest`](Self::dequeue_latest).
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl Default for DisplayQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
