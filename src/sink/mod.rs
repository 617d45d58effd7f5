//! Sink module
//!
//! The decode-thread side of frame delivery: state machine, errors and the
//! [`FrameSink`] itself.

mod error;
mod frame_sink;
mod state;

pub use error::{NegotiationError, SinkError};
pub use frame_sink::{FrameSink, SinkStats};
pub use state::{SinkEvent, SinkState};
