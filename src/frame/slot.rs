//! Frame slot module
//!
//! Single-element, last-writer-wins exchange cell between the decode thread
//! and the render thread. The lock only ever guards a reference swap.

use std::sync::OnceLock;

use parking_lot::Mutex;

use super::buffer::{FrameBuffer, FrameSize};

#[derive(Default)]
struct SlotContents {
    frame: Option<FrameBuffer>,
    /// Incremented on every store, 0 means never stored
    generation: u64,
}

/// Latest-frame slot shared by producer and consumer
#[derive(Default)]
pub struct FrameSlot {
    current: Mutex<SlotContents>,
    negotiated: OnceLock<FrameSize>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resident frame with `buffer`
    ///
    /// Returns the generation number assigned to this store. The previous
    /// frame's reference is dropped after the lock is released.
    pub fn store(&self, buffer: &FrameBuffer) -> u64 {
        let incoming = buffer.acquire();
        let (previous, generation) = {
            let mut current = self.current.lock();
            current.generation += 1;
            (current.frame.replace(incoming), current.generation)
        };
        drop(previous);
        generation
    }

    /// Acquire a reference to the resident frame, if any
    pub fn load(&self) -> Option<FrameBuffer> {
        self.current.lock().frame.as_ref().map(FrameBuffer::acquire)
    }

    /// Like [`load`](Self::load), also returning the store generation of the frame
    pub fn load_with_generation(&self) -> Option<(FrameBuffer, u64)> {
        let current = self.current.lock();
        current
            .frame
            .as_ref()
            .map(|frame| (frame.acquire(), current.generation))
    }

    /// Drop the resident frame
    pub fn clear(&self) {
        let previous = self.current.lock().frame.take();
        drop(previous);
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().frame.is_none()
    }

    /// Number of stores so far
    pub fn generation(&self) -> u64 {
        self.current.lock().generation
    }

    /// Record the stream dimensions
    ///
    /// Dimensions are fixed for the life of the slot. Negotiating the same
    /// size again succeeds; a different size returns the one already recorded.
    pub fn negotiate(&self, size: FrameSize) -> Result<FrameSize, FrameSize> {
        let negotiated = *self.negotiated.get_or_init(|| size);
        if negotiated == size {
            Ok(negotiated)
        } else {
            Err(negotiated)
        }
    }

    pub fn negotiated_size(&self) -> Option<FrameSize> {
        self.negotiated.get().copied()
    }
}
