use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::decode::types::DecodedView;
use crate::display::ensure_capacity;
use crate::error::PipelineError;
use crate::header::FrameKind;

/// The most recent fully decoded frame of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedFrame {
    pub kind: Option<FrameKind>,
    pub width: u32,
    pub height: u32,
    /// Increases by one per publish.
    pub sequence: u64,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Default)]
struct Slots {
    slots: [Arc<PublishedFrame>; 2],
    active: usize,
    published: u64,
}

/// Publish side of a decode service's triple buffer.
///
/// The decoder's own scratch is the third buffer. The two slots here are
/// reference counted: readers take a clone of the active `Arc` and may read
/// it after the lock is released. Publishing writes into the inactive slot,
/// or into a fresh allocation when a reader still holds it, then swaps the
/// active index. Both happen under the mutex, so a reader sees either the
/// previous frame or the new one in full.
#[derive(Debug, Default)]
pub struct TripleBuffer {
    inner: Mutex<Slots>,
}

impl TripleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy `view` into the inactive slot and make it active.
    pub fn publish(&self, kind: FrameKind, view: &DecodedView<'_>) -> Result<u64, PipelineError> {
        let mut inner = self.lock();
        let idx = 1 - inner.active;
        let sequence = inner.published + 1;

        if Arc::get_mut(&mut inner.slots[idx]).is_none() {
            inner.slots[idx] = Arc::new(PublishedFrame::default());
        }
        let slot = Arc::make_mut(&mut inner.slots[idx]);
        ensure_capacity(&mut slot.pixels, view.pixels.len())?;
        slot.pixels.clear();
        slot.pixels.extend_from_slice(view.pixels);
        slot.kind = Some(kind);
        slot.width = view.width;
        slot.height = view.height;
        slot.sequence = sequence;

        inner.active = idx;
        inner.published = sequence;
        Ok(sequence)
    }

    /// Snapshot of the active slot, or `None` before the first publish.
    pub fn peek(&self) -> Option<Arc<PublishedFrame>> {
        let inner = self.lock();
        if inner.published == 0 {
            return None;
        }
        Some(Arc::clone(&inner.slots[inner.active]))
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Free both slots. Outstanding snapshots stay valid.
    pub fn release(&self) {
        let mut inner = self.lock();
        *inner = Slots::default();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn view(fill: &[u8]) -> DecodedView<'_> {
        DecodedView {
            width: fill.len() as u32 / 2,
            height: 1,
            pixels: fill,
        }
    }

    #[test]
    fn peek_before_publish_is_none() {
        assert!(TripleBuffer::new().peek().is_none());
    }

    #[test]
    fn held_snapshot_is_not_overwritten() {
        let tb = TripleBuffer::new();
        tb.publish(FrameKind::Raw, &view(&[1; 8])).unwrap();
        let first = tb.peek().unwrap();

        tb.publish(FrameKind::Raw, &view(&[2; 8])).unwrap();
        tb.publish(FrameKind::Raw, &view(&[3; 8])).unwrap();

        // The third publish targets the slot `first` still holds.
        assert_eq!(first.pixels, vec![1; 8]);
        assert_eq!(first.sequence, 1);

        let latest = tb.peek().unwrap();
        assert_eq!(latest.pixels, vec![3; 8]);
        assert_eq!(latest.sequence, 3);
        assert_eq!(latest.kind, Some(FrameKind::Raw));
    }

    #[test]
    fn readers_never_see_a_mixed_frame() {
        let tb = Arc::new(TripleBuffer::new());
        tb.publish(FrameKind::Lz4, &view(&[0; 4096])).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let tb = Arc::clone(&tb);
                thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..2000 {
                        let frame = tb.peek().unwrap();
                        let first = frame.pixels[0];
                        assert!(frame.pixels.iter().all(|&b| b == first));
                        assert!(frame.sequence >= last_seq);
                        last_seq = frame.sequence;
                    }
                })
            })
            .collect();

        for n in 1..=500u32 {
            let fill = vec![(n % 251) as u8; 4096];
            tb.publish(FrameKind::Lz4, &view(&fill)).unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(tb.published(), 501);
    }

    #[test]
    fn release_clears_slots() {
        let tb = TripleBuffer::new();
        tb.publish(FrameKind::Jpeg, &view(&[9; 2])).unwrap();
        let held = tb.peek().unwrap();
        tb.release();
        assert!(tb.peek().is_none());
        assert_eq!(held.pixels, vec![9; 2]);
    }
}
