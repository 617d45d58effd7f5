//! Sink errors
//!
//! Reported through the sink's state and logs; never raised on the render thread.

use thiserror::Error;

use crate::frame::{FrameSize, PixelFormat};
use crate::pipeline::FlowStatus;

use super::state::SinkState;

/// Why the first frame could not establish the stream format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("expected fixed caps in preroll, got {0}")]
    NotFixed(String),

    #[error("unsupported media type '{0}'")]
    MediaType(String),

    #[error("no frame dimensions available")]
    MissingDimensions,

    #[error("unsupported pixel layout {0:?}")]
    Format(PixelFormat),

    #[error("preroll buffer is {buffer}, caps declare {caps}")]
    BufferSize { buffer: FrameSize, caps: FrameSize },

    #[error("slot already negotiated {negotiated}, caps declare {requested}")]
    AlreadyNegotiated {
        negotiated: FrameSize,
        requested: FrameSize,
    },
}

/// Errors returned by the sink's callback entry points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("unexpected buffer while {state}")]
    UnexpectedBuffer { state: SinkState },

    #[error("unexpected preroll while {state}")]
    UnexpectedPreroll { state: SinkState },

    #[error("buffer is {actual}, stream was negotiated at {expected}")]
    BufferSize { expected: FrameSize, actual: FrameSize },

    #[error("buffer layout {actual:?} differs from negotiated {expected:?}")]
    BufferFormat {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    #[error("mid-stream renegotiation rejected: {0}")]
    RenegotiationRejected(String),

    #[error("pipeline failed to hand over an announced buffer")]
    PullFailure,
}

impl SinkError {
    /// Status code reported back to the pipeline
    pub fn flow_status(&self) -> FlowStatus {
        match self {
            SinkError::Negotiation(_)
            | SinkError::BufferSize { .. }
            | SinkError::BufferFormat { .. }
            | SinkError::RenegotiationRejected(_) => FlowStatus::NotNegotiated,
            SinkError::UnexpectedBuffer { .. } | SinkError::UnexpectedPreroll { .. } => {
                FlowStatus::Unexpected
            }
            SinkError::PullFailure => FlowStatus::Error,
        }
    }
}
