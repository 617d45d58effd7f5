//! Frame sources driven by the pipeline worker

use std::time::Duration;

use anyhow::{bail, Result};

use crate::frame::FrameBuffer;

use super::caps::Caps;

/// Something that produces decoded pictures in presentation order
pub trait FrameSource: Send {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Fixed caps of the produced frames
    fn caps(&self) -> Caps;

    /// Nominal frame rate
    fn fps(&self) -> f64;

    /// Next picture, `Ok(None)` at the end of the stream
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>>;

    /// Go back to the first picture
    fn rewind(&mut self) -> Result<()>;

    /// Continue from the picture shown at `position`
    fn seek(&mut self, position: Duration) -> Result<()> {
        bail!("{} is not seekable (requested {:?})", self.describe(), position)
    }

    /// Presentation time of the last picture returned
    fn position(&self) -> Duration {
        Duration::ZERO
    }

    /// Total length, `None` when unknown or endless
    fn duration(&self) -> Option<Duration> {
        None
    }
}
