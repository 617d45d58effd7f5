//! Pipeline module
//!
//! The contract between a decode pipeline and the frame sink (caps, samples,
//! flow status, callbacks) plus a worker thread that drives a [`FrameSource`].

mod callbacks;
mod caps;
mod source;
mod worker;

pub use callbacks::{FlowStatus, PipelineCallbacks, Sample};
pub use caps::{Caps, CapsValue, RAW_RGB};
pub use source::FrameSource;
pub use worker::{Pipeline, PipelineCommand, PipelineProgress, PipelineState};
