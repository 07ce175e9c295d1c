use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tracing::trace;

use crate::error::PipelineError;

/// Grow `buf` so it can hold at least `size` bytes without reallocating.
///
/// Never shrinks. Allocation failure is reported instead of aborting.
pub fn ensure_capacity(buf: &mut Vec<u8>, size: usize) -> Result<(), PipelineError> {
    if buf.capacity() >= size {
        return Ok(());
    }
    buf.try_reserve_exact(size - buf.len())
        .map_err(|_| PipelineError::Allocation { size })
}

// ── PoolStats ────────────────────────────────────────────────────

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers created because no idle buffer was available.
    pub allocated: u64,
    /// Acquisitions served from the idle list.
    pub reused: u64,
    /// Buffers released back to the pool (kept or not).
    pub returned: u64,
    /// Buffers currently idle.
    pub idle: usize,
}

// ── FramePool ────────────────────────────────────────────────────

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
}

impl PoolInner {
    fn release(&self, mut data: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            data.clear();
            idle.push(data);
        } else {
            trace!("pool full, freeing {} byte buffer", data.capacity());
        }
    }
}

/// Reusable pixel buffers for frames handed to the display queue.
///
/// Cloning the pool is cheap; all clones share the same idle list.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Pool that keeps at most `max_idle` released buffers around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                returned: AtomicU64::new(0),
            }),
        }
    }

    /// A zero-filled buffer of exactly `size` bytes.
    pub fn acquire(&self, size: usize) -> Result<PixelBuffer, PipelineError> {
        let recycled = {
            let mut idle = self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner);
            // Prefer a buffer that is already large enough.
            match idle.iter().position(|b| b.capacity() >= size) {
                Some(i) => Some(idle.swap_remove(i)),
                None => idle.pop(),
            }
        };

        let mut data = match recycled {
            Some(data) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };

        ensure_capacity(&mut data, size)?;
        data.resize(size, 0);

        Ok(PixelBuffer {
            data,
            pool: Arc::downgrade(&self.inner),
        })
    }

    /// A pool buffer holding a copy of `pixels`.
    pub fn copy_from(&self, pixels: &[u8]) -> Result<PixelBuffer, PipelineError> {
        let mut buf = self.acquire(pixels.len())?;
        buf.data.copy_from_slice(pixels);
        Ok(buf)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            returned: self.inner.returned.load(Ordering::Relaxed),
            idle: self.idle_count(),
        }
    }

    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("max_idle", &self.inner.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

// ── PixelBuffer ──────────────────────────────────────────────────

/// An owned pixel buffer that goes back to its pool when dropped.
///
/// Buffers outliving their pool are simply freed.
pub struct PixelBuffer {
    data: Vec<u8>,
    pool: Weak<PoolInner>,
}

impl PixelBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for PixelBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("len", &self.data.len())
            .field("pooled", &(self.pool.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_capacity_grows_only() {
        let mut buf = Vec::with_capacity(64);
        ensure_capacity(&mut buf, 16).unwrap();
        assert!(buf.capacity() >= 64);

        ensure_capacity(&mut buf, 1024).unwrap();
        assert!(buf.capacity() >= 1024);
        assert!(buf.is_empty());
    }

    #[test]
    fn ensure_capacity_reports_allocation_failure() {
        let mut buf = Vec::new();
        let err = ensure_capacity(&mut buf, usize::MAX).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation { size } if size == usize::MAX));
    }

    #[test]
    fn dropped_buffer_is_reused() {
        let pool = FramePool::new(2);
        let buf = pool.acquire(100).unwrap();
        assert_eq!(buf.len(), 100);
        drop(buf);

        assert_eq!(pool.idle_count(), 1);
        let again = pool.acquire(50).unwrap();
        assert_eq!(again.len(), 50);
        assert!(again.iter().all(|&b| b == 0));

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.returned, 1);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = FramePool::new(2);
        let bufs: Vec<_> = (0..5).map(|_| pool.acquire(8).unwrap()).collect();
        drop(bufs);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.stats().returned, 5);
    }

    #[test]
    fn buffer_outliving_pool_is_freed() {
        let pool = FramePool::new(4);
        let buf = pool.copy_from(&[1, 2, 3]).unwrap();
        drop(pool);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        drop(buf);
    }
}
