use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::decode::{FrameDecode, PublishedFrame, TripleBuffer};
use crate::display::{DisplayQueue, FrameDescriptor, FramePool};
use crate::error::PipelineError;
use crate::header::FrameKind;
use crate::stats::PipelineStats;

// ── ServiceState ─────────────────────────────────────────────────

/// Lifecycle of a [`DecodeService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Stopped = 0,
    Initializing = 1,
    Running = 2,
    Stopping = 3,
}

impl ServiceState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ServiceState::Initializing,
            2 => ServiceState::Running,
            3 => ServiceState::Stopping,
            _ => ServiceState::Stopped,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Initializing => "initializing",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

// ── Inbox ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct InboxState {
    items: VecDeque<Bytes>,
    closed: bool,
}

/// Bounded hand-off to the worker. A full inbox evicts its oldest payload,
/// so the newest one is always decoded next.
#[derive(Debug)]
struct Inbox {
    state: Mutex<InboxState>,
    ready: Condvar,
    depth: usize,
}

impl Inbox {
    fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            state: Mutex::new(InboxState {
                items: VecDeque::with_capacity(depth),
                closed: false,
            }),
            ready: Condvar::new(),
            depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `payload`. Returns the evicted payload if the inbox was full,
    /// or `Err` with `payload` if it is closed.
    fn push(&self, payload: Bytes) -> Result<Option<Bytes>, Bytes> {
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                return Err(payload);
            }
            let evicted = if state.items.len() >= self.depth {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(payload);
            evicted
        };
        self.ready.notify_one();
        Ok(evicted)
    }

    /// Block until a payload arrives. Returns `None` once closed and empty.
    fn pop(&self) -> Option<Bytes> {
        let state = self.lock();
        let mut state = self
            .ready
            .wait_while(state, |s| s.items.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.items.pop_front()
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

// ── DecodeService ────────────────────────────────────────────────

/// Everything the worker thread needs besides its input channel.
struct Worker {
    decoder: Box<dyn FrameDecode>,
    buffers: Arc<TripleBuffer>,
    queue: Arc<DisplayQueue>,
    pool: FramePool,
    stats: Arc<PipelineStats>,
}

impl Worker {
    fn run(mut self, inbox: Arc<Inbox>) {
        let kind = self.decoder.kind();
        while let Some(payload) = inbox.pop() {
            match self.handle(&payload) {
                Ok(()) => self.stats.record_decoded(),
                Err(e) => {
                    warn!("dropping {kind} frame ({} bytes): {e}", payload.len());
                    self.stats.record_decode_error();
                }
            }
        }
        debug!("{kind} worker input closed");
    }

    /// Decode one payload, publish it, and queue a copy for display.
    fn handle(&mut self, payload: &[u8]) -> Result<(), PipelineError> {
        let kind = self.decoder.kind();
        let view = self.decoder.decode(payload)?;
        self.buffers.publish(kind, &view)?;

        let buffer = self.pool.copy_from(view.pixels)?;
        let frame = FrameDescriptor::new(kind, view.width, view.height, payload.len(), buffer);
        if !self.queue.enqueue(frame) {
            debug!("display queue closed, {kind} frame not queued");
        }
        Ok(())
    }
}

/// A running decoder bound to one [`FrameKind`].
///
/// [`process`](Self::process) never blocks: payloads go to a blocking worker
/// through a bounded inbox, and when the worker falls behind the oldest
/// pending payload is dropped in favour of the new one.
pub struct DecodeService {
    kind: FrameKind,
    state: Arc<AtomicU8>,
    inbox: Arc<Inbox>,
    worker: Option<JoinHandle<()>>,
    buffers: Arc<TripleBuffer>,
    stats: Arc<PipelineStats>,
}

impl DecodeService {
    /// Spawn the worker for `decoder` on the blocking pool.
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn start(
        decoder: Box<dyn FrameDecode>,
        queue: Arc<DisplayQueue>,
        pool: FramePool,
        stats: Arc<PipelineStats>,
        queue_depth: usize,
    ) -> Result<Self, PipelineError> {
        let kind = decoder.kind();
        let state = Arc::new(AtomicU8::new(ServiceState::Initializing as u8));

        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            PipelineError::Other(format!("cannot start {kind} decode service: {e}"))
        })?;

        let buffers = Arc::new(TripleBuffer::new());
        let inbox = Arc::new(Inbox::new(queue_depth));
        let worker = Worker {
            decoder,
            buffers: Arc::clone(&buffers),
            queue,
            pool,
            stats: Arc::clone(&stats),
        };
        let join = {
            let inbox = Arc::clone(&inbox);
            handle.spawn_blocking(move || worker.run(inbox))
        };

        state.store(ServiceState::Running as u8, Ordering::SeqCst);
        info!("{kind} decode service started");

        Ok(Self {
            kind,
            state,
            inbox,
            worker: Some(join),
            buffers,
            stats,
        })
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Hand a payload to the worker.
    ///
    /// Returns `false` only if the service is not running. A busy worker
    /// loses its oldest pending payload instead, counted as an input drop.
    pub fn process(&self, payload: Bytes) -> bool {
        if !self.is_running() {
            return false;
        }

        match self.inbox.push(payload) {
            Ok(None) => true,
            Ok(Some(stale)) => {
                self.stats.record_input_drop();
                debug!(
                    "{} worker busy, dropped pending {} byte payload",
                    self.kind,
                    stale.len()
                );
                true
            }
            Err(_) => {
                debug!("{} inbox closed, payload not queued", self.kind);
                false
            }
        }
    }

    /// Latest frame published by the worker.
    pub fn peek_latest(&self) -> Option<Arc<PublishedFrame>> {
        self.buffers.peek()
    }

    /// Close the input, wait for queued payloads to drain, join the worker
    /// and free the triple buffer.
    pub async fn stop(&mut self) {
        if self.state() == ServiceState::Stopped {
            return;
        }
        self.state
            .store(ServiceState::Stopping as u8, Ordering::SeqCst);

        self.inbox.close();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("{} worker panicked: {e}", self.kind);
            }
        }
        self.buffers.release();

        self.state.store(ServiceState::Stopped as u8, Ordering::SeqCst);
        info!("{} decode service stopped", self.kind);
    }
}

impl Drop for DecodeService {
    fn drop(&mut self) {
        self.inbox.close();
    }
}

impl fmt::Debug for DecodeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeService")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
