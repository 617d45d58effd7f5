//! Frame module
//!
//! Reference-counted pictures and the slot that hands them across threads.

mod buffer;
mod slot;

pub use buffer::{FrameBuffer, FrameError, FrameSize, PixelFormat, WeakFrameBuffer};
pub use slot::FrameSlot;
