//! Point-in-time frame snapshots
//!
//! A snapshot is a deep copy: it shares nothing with the slot and can be kept,
//! mutated or written to disk from any thread.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::frame::{FrameSize, FrameSlot};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no frame available")]
    NoFrame,

    #[error("failed to write snapshot: {0}")]
    Image(#[from] image::ImageError),
}

/// Clonable, thread-safe snapshot source for one slot
#[derive(Clone)]
pub struct Snapshotter {
    slot: Arc<FrameSlot>,
}

impl Snapshotter {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self { slot }
    }

    /// Copy the current frame, or `None` when nothing was stored yet
    pub fn snapshot(&self) -> Option<RgbImage> {
        let frame = self.slot.load()?;
        let image = frame.to_rgb_image();
        frame.release();
        Some(image)
    }

    /// Write the current frame to `path`; the encoder follows the file extension
    pub fn save(&self, path: &Path) -> Result<FrameSize, SnapshotError> {
        let image = self.snapshot().ok_or(SnapshotError::NoFrame)?;
        image.save(path)?;
        let size = FrameSize::new(image.width(), image.height());
        info!("Saved {} snapshot to {}", size, path.display());
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameBuffer, PixelFormat};

    #[test]
    fn test_snapshot_of_empty_slot() {
        let snapshotter = Snapshotter::new(Arc::new(FrameSlot::new()));
        assert!(snapshotter.snapshot().is_none());
        let err = snapshotter.save(Path::new("unused.png")).unwrap_err();
        assert!(matches!(err, SnapshotError::NoFrame));
    }

    #[test]
    fn test_snapshot_is_independent_of_slot() {
        let slot = Arc::new(FrameSlot::new());
        let size = FrameSize::new(4, 3);
        let first = FrameBuffer::solid(size, PixelFormat::BGRX, [10, 20, 30]).unwrap();
        slot.store(&first);

        let snapshotter = Snapshotter::new(slot.clone());
        let mut copy = snapshotter.snapshot().unwrap();
        // The snapshot holds no reference to the frame
        assert_eq!(first.ref_count(), 2);

        copy.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        assert_eq!(slot.load().unwrap().pixel_rgb(0, 0), Some([10, 20, 30]));

        slot.store(&FrameBuffer::solid(size, PixelFormat::BGRX, [1, 1, 1]).unwrap());
        assert_eq!(copy.get_pixel(1, 1).0, [10, 20, 30]);
        assert_eq!(copy.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_snapshot_from_another_thread() {
        let slot = Arc::new(FrameSlot::new());
        slot.store(&FrameBuffer::solid(FrameSize::new(2, 2), PixelFormat::BGRX, [7, 8, 9]).unwrap());

        let snapshotter = Snapshotter::new(slot);
        let image = std::thread::spawn(move || snapshotter.snapshot())
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [7, 8, 9]);
    }

    #[test]
    fn test_save_png() {
        let slot = Arc::new(FrameSlot::new());
        slot.store(&FrameBuffer::solid(FrameSize::new(5, 4), PixelFormat::BGRX, [0, 128, 255]).unwrap());

        let path = std::env::temp_dir().join(format!("framesink-snapshot-{}.png", std::process::id()));
        let size = Snapshotter::new(slot).save(&path).unwrap();
        assert_eq!(size, FrameSize::new(5, 4));

        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(reloaded.get_pixel(4, 3).0, [0, 128, 255]);
        let _ = std::fs::remove_file(&path);
    }
}
