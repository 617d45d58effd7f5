//! Pipeline callback contract
//!
//! What a decode pipeline calls on its own streaming thread. Every callback
//! must return promptly.

use std::fmt;

use crate::frame::FrameBuffer;

use super::caps::Caps;

/// A pulled buffer together with the caps it was produced under
#[derive(Debug, Clone)]
pub struct Sample {
    pub buffer: FrameBuffer,
    pub caps: Caps,
}

impl Sample {
    pub fn new(buffer: FrameBuffer, caps: Caps) -> Self {
        Self { buffer, caps }
    }
}

/// Status handed back to the pipeline after each buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Keep streaming
    Ok,
    /// Data arrived at a point where none was expected
    Unexpected,
    /// Format could not be agreed on
    NotNegotiated,
    /// Fatal streaming error
    Error,
}

impl FlowStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FlowStatus::Ok)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStatus::Ok => "ok",
            FlowStatus::Unexpected => "unexpected",
            FlowStatus::NotNegotiated => "not-negotiated",
            FlowStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Receiver of pipeline notifications
///
/// `None` samples mean the pipeline announced a buffer but could not hand it over.
pub trait PipelineCallbacks: Send + Sync {
    /// End of stream reached
    fn eos(&self);

    /// First buffer after start or flush
    fn new_preroll(&self, sample: Option<Sample>) -> FlowStatus;

    /// Steady-state buffer
    fn new_buffer(&self, sample: Option<Sample>) -> FlowStatus;

    /// The pipeline is discarding queued data and will preroll again
    fn flush(&self) {}
}
