//! Test sender: streams image files to a receiver.
//!
//! | Kind | File contents              | Sent as                    |
//! |------|----------------------------|----------------------------|
//! | jpeg | JPEG image                 | as-is                      |
//! | lz4  | RGB565 big-endian pixels   | LZ4 frame of the file      |
//! | raw  | RGB565 big-endian pixels   | as-is                      |

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use pixwire_core::decode::JPEG_SOI;
use pixwire_core::{FrameCodec, FrameKind, PipelineError, WireFrame};

/// Build the wire frame for one file.
pub fn load_frame(path: &Path, kind: FrameKind) -> Result<WireFrame, PipelineError> {
    let data = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let payload = match kind {
        FrameKind::Jpeg => {
            if !data.starts_with(&JPEG_SOI) {
                warn!("{} does not look like a JPEG", path.display());
            }
            data
        }
        FrameKind::Lz4 => compress_lz4(&data)?,
        FrameKind::Raw => data,
    };
    WireFrame::new(kind, payload)
}

/// Wrap `data` in a single LZ4 frame.
pub fn compress_lz4(data: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::with_capacity(data.len() / 2));
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

/// Load every file in `paths` (directories contribute their files in
/// name order).
pub fn load_frames(paths: &[PathBuf], kind: FrameKind) -> Result<Vec<WireFrame>, PipelineError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| PipelineError::io(path, e))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    files.iter().map(|p| load_frame(p, kind)).collect()
}

/// Stream `frames` to `addr` at `fps`, repeating `loops` times (0 =
/// until stopped). Returns the number of frames sent.
pub async fn stream_frames(
    addr: &str,
    frames: &[WireFrame],
    fps: u32,
    loops: u32,
    running: Arc<AtomicBool>,
) -> Result<u64, PipelineError> {
    if frames.is_empty() {
        return Err(PipelineError::Other("nothing to send".into()));
    }

    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    info!("connected to {addr}, sending {} frames at {fps} fps", frames.len());

    let max_payload = frames.iter().map(WireFrame::payload_len).max().unwrap_or(0);
    let mut framed = Framed::new(stream, FrameCodec::new(max_payload));
    let mut tick = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));

    let mut sent: u64 = 0;
    let mut pass: u32 = 0;
    'outer: while loops == 0 || pass < loops {
        for frame in frames {
            if !running.load(Ordering::SeqCst) {
                break 'outer;
            }
            tick.tick().await;
            framed.send(frame.clone()).await?;
            sent += 1;
        }
        pass += 1;
    }

    info!("sent {sent} frames");
    Ok(sent)
}
