//! Video frame sink
//!
//! Delivers decoded pictures from a producer thread to a UI surface without
//! either side waiting on the other. The producer stores every frame into a
//! single-frame slot and posts a coalesced repaint request; the surface paints
//! whatever frame is newest when it gets to run.
//!
//! ```rust,ignore
//! let slot = Arc::new(FrameSlot::new());
//! let (scheduler, repaints) = scheduler::channel(Some(waker));
//! let sink = Arc::new(FrameSink::new(slot.clone(), scheduler));
//! let mut surface = RenderSurface::new(slot, repaints, Rgb([0, 0, 0]));
//! ```

pub mod config;
pub mod frame;
pub mod ipc;
pub mod pipeline;
pub mod scheduler;
pub mod sink;
pub mod surface;
pub mod utils;
pub mod video;

pub use frame::{FrameBuffer, FrameSize, FrameSlot, PixelFormat};
pub use scheduler::Scheduler;
pub use sink::{FrameSink, SinkState};
pub use surface::RenderSurface;
