//! Single-client TCP listener feeding the mode controller.
//!
//! Clients are served one at a time: while a connection is open, further
//! clients wait in the accept backlog. Each connection gets a fresh
//! [`StreamAccumulator`], so a dropped connection never leaves partial
//! bytes behind for the next one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{FramingConfig, StreamAccumulator};
use crate::controller::ModeController;
use crate::error::PipelineError;
use crate::stats::PipelineStats;

/// Back-off after a failed `accept`.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// State shared between the server handle and its accept task.
struct Shared {
    framing: FramingConfig,
    controller: Arc<Mutex<ModeController>>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    running: AtomicBool,
    connected: AtomicBool,
}

/// Handle to the listener task.
pub struct StreamServer {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl StreamServer {
    /// Bind `addr` and start accepting clients.
    pub async fn bind(
        addr: &str,
        framing: FramingConfig,
        controller: Arc<Mutex<ModeController>>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, PipelineError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PipelineError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("listening for image stream on {local_addr}");

        let shared = Arc::new(Shared {
            framing,
            controller,
            stats,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(true),
            connected: AtomicBool::new(false),
        });
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));

        Ok(Self {
            local_addr,
            shared,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a client is currently connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Close the listener and any open connection, then wait for the task.
    pub async fn stop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("listener task failed: {e}");
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let accepted = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => handle_client(stream, peer, &shared).await,
            Err(e) => {
                error!("accept failed: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    info!("listener stopped");
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, shared: &Shared) {
    info!("client connected: {peer}");
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed for {peer}: {e}");
    }
    shared.connected.store(true, Ordering::SeqCst);

    let result = serve_connection(
        stream,
        &shared.framing,
        &shared.controller,
        Arc::clone(&shared.stats),
        &shared.cancel,
    )
    .await;

    shared.connected.store(false, Ordering::SeqCst);
    match result {
        Ok(frames) => info!("client {peer} disconnected after {frames} frames"),
        Err(e) => error!("client {peer} dropped: {e}"),
    }
}

/// Read `reader` to the end, routing every complete frame.
///
/// Returns the number of frames extracted. Routing failures are logged
/// and do not end the connection; read errors do.
pub async fn serve_connection<R>(
    mut reader: R,
    framing: &FramingConfig,
    controller: &Mutex<ModeController>,
    stats: Arc<PipelineStats>,
    cancel: &CancellationToken,
) -> Result<u64, PipelineError>
where
    R: AsyncRead + Unpin,
{
    let mut acc = StreamAccumulator::with_stats(framing.accumulator_capacity, stats);
    let mut buf = vec![0u8; framing.read_chunk_size.max(1)];
    let mut frames: u64 = 0;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            if !acc.is_empty() {
                debug!("connection closed with {} bytes of partial frame", acc.len());
            }
            break;
        }

        for frame in acc.feed(&buf[..n]) {
            frames += 1;
            let (header, payload) = frame.into_parts();
            let mut ctl = controller.lock().await;
            if let Err(e) = ctl.route(header.kind, payload).await {
                warn!("failed to route {} frame: {e}", header.kind);
            }
        }
    }

    Ok(frames)
}
