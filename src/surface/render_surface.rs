//! Render surface
//!
//! UI-thread consumer of the frame slot. The host calls
//! [`RenderSurface::on_repaint`] from its paint cycle; the surface loads the
//! newest frame, letterboxes it into the drawing area and hands it to a
//! [`Canvas`]. Frames stored between two paints are never seen.

use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tracing::trace;

use crate::frame::{FrameBuffer, FrameSize, FrameSlot};
use crate::scheduler::RepaintReceiver;

use super::layout::{fit_centered, Rect};
use super::snapshot::{SnapshotError, Snapshotter};

/// Host drawing backend
pub trait Canvas {
    /// Fill `rect` with a solid color
    fn fill(&mut self, rect: Rect, color: Rgb<u8>);

    /// Draw `frame` scaled into `rect`
    fn draw_frame(&mut self, rect: Rect, frame: &FrameBuffer);
}

/// What the last repaint put on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// No frame yet, background only
    Fallback,
    /// Frame drawn into `rect`
    Frame { rect: Rect, generation: u64 },
}

/// Paint counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceStats {
    /// Distinct frames drawn
    pub painted: u64,
    /// Frames replaced in the slot before they could be drawn
    pub dropped: u64,
}

pub struct RenderSurface {
    slot: Arc<FrameSlot>,
    notifications: RepaintReceiver,
    background: Rgb<u8>,
    last_generation: u64,
    stats: SurfaceStats,
}

impl RenderSurface {
    pub fn new(slot: Arc<FrameSlot>, notifications: RepaintReceiver, background: Rgb<u8>) -> Self {
        Self {
            slot,
            notifications,
            background,
            last_generation: 0,
            stats: SurfaceStats::default(),
        }
    }

    /// Consume a pending repaint request; true if there was one
    pub fn take_notification(&self) -> bool {
        match self.notifications.take() {
            Some(request) => {
                trace!(latency = ?request.requested_at.elapsed(), "RenderSurface: repaint request");
                true
            }
            None => false,
        }
    }

    /// Draw the newest frame, or the background when there is none
    pub fn on_repaint(&mut self, canvas: &mut dyn Canvas, area: Rect) -> PaintOutcome {
        self.take_notification();

        let Some((frame, generation)) = self.slot.load_with_generation() else {
            canvas.fill(area, self.background);
            return PaintOutcome::Fallback;
        };

        canvas.fill(area, self.background);
        let rect = fit_centered(frame.size(), area);
        canvas.draw_frame(rect, &frame);
        frame.release();

        self.account(generation);
        PaintOutcome::Frame { rect, generation }
    }

    fn account(&mut self, generation: u64) {
        if generation == self.last_generation {
            return;
        }
        if self.last_generation != 0 && generation > self.last_generation + 1 {
            self.stats.dropped += generation - self.last_generation - 1;
        }
        self.stats.painted += 1;
        self.last_generation = generation;
    }

    /// Negotiated frame dimensions, once known
    pub fn preferred_size(&self) -> Option<FrameSize> {
        self.slot.negotiated_size()
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    /// Deep copy of the current frame
    pub fn snapshot(&self) -> Option<RgbImage> {
        self.snapshotter().snapshot()
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<FrameSize, SnapshotError> {
        self.snapshotter().save(path)
    }

    /// Snapshot source that can be moved to another thread
    pub fn snapshotter(&self) -> Snapshotter {
        Snapshotter::new(self.slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::scheduler::{self, Scheduler};

    #[derive(Default)]
    struct RecordingCanvas {
        fills: Vec<(Rect, Rgb<u8>)>,
        frames: Vec<(Rect, FrameSize)>,
    }

    impl Canvas for RecordingCanvas {
        fn fill(&mut self, rect: Rect, color: Rgb<u8>) {
            self.fills.push((rect, color));
        }

        fn draw_frame(&mut self, rect: Rect, frame: &FrameBuffer) {
            self.frames.push((rect, frame.size()));
        }
    }

    fn surface() -> (RenderSurface, Scheduler, Arc<FrameSlot>) {
        let slot = Arc::new(FrameSlot::new());
        let (scheduler, receiver) = scheduler::channel(None);
        let surface = RenderSurface::new(slot.clone(), receiver, Rgb([0, 0, 0]));
        (surface, scheduler, slot)
    }

    fn frame(width: u32, height: u32) -> FrameBuffer {
        FrameBuffer::solid(FrameSize::new(width, height), PixelFormat::BGRX, [50, 60, 70]).unwrap()
    }

    #[test]
    fn test_empty_slot_paints_fallback() {
        let (mut surface, _scheduler, _slot) = surface();
        let mut canvas = RecordingCanvas::default();
        let area = Rect::new(0, 0, 320, 240);

        assert_eq!(surface.on_repaint(&mut canvas, area), PaintOutcome::Fallback);
        assert_eq!(canvas.fills, vec![(area, Rgb([0, 0, 0]))]);
        assert!(canvas.frames.is_empty());
        assert_eq!(surface.preferred_size(), None);
    }

    #[test]
    fn test_frame_is_letterboxed_and_released() {
        let (mut surface, _scheduler, slot) = surface();
        let f = frame(64, 48);
        slot.store(&f);
        let mut canvas = RecordingCanvas::default();

        let outcome = surface.on_repaint(&mut canvas, Rect::new(0, 0, 400, 120));
        let expected = Rect::new(120, 0, 160, 120);
        assert_eq!(outcome, PaintOutcome::Frame { rect: expected, generation: 1 });
        assert_eq!(canvas.frames, vec![(expected, FrameSize::new(64, 48))]);
        // Only the test and the slot still hold the frame
        assert_eq!(f.ref_count(), 2);
    }

    #[test]
    fn test_repaint_consumes_notification() {
        let (mut surface, scheduler, slot) = surface();
        slot.store(&frame(8, 8));
        scheduler.notify();

        let mut canvas = RecordingCanvas::default();
        surface.on_repaint(&mut canvas, Rect::new(0, 0, 8, 8));
        assert!(!surface.take_notification());
    }

    #[test]
    fn test_dropped_frames_are_counted() {
        let (mut surface, _scheduler, slot) = surface();
        let mut canvas = RecordingCanvas::default();
        let area = Rect::new(0, 0, 8, 8);

        slot.store(&frame(8, 8));
        surface.on_repaint(&mut canvas, area);
        // Repainting the same frame again is not a new frame
        surface.on_repaint(&mut canvas, area);

        for _ in 0..4 {
            slot.store(&frame(8, 8));
        }
        surface.on_repaint(&mut canvas, area);

        assert_eq!(surface.stats(), SurfaceStats { painted: 2, dropped: 3 });
    }

    #[test]
    fn test_dropping_surface_silences_scheduler() {
        let (surface, scheduler, _slot) = surface();
        drop(surface);
        assert_eq!(scheduler.notify(), scheduler::Notify::Dropped);
    }
}
