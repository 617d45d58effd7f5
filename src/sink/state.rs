//! Sink state machine
//!
//! One explicit state plus an exhaustive transition table.

use std::fmt;

/// Sink lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkState {
    /// Waiting for the first buffer
    #[default]
    Idle,
    /// Extracting dimensions from the preroll caps
    Negotiating,
    /// Accepting buffers
    Streaming,
    /// Stream finished, last frame stays visible
    EndOfStream,
    /// Negotiation or pull failure, needs an external reset
    Error,
}

/// Inputs that drive [`SinkState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Preroll,
    Negotiated,
    NegotiationFailed,
    Buffer,
    EndOfStream,
    PullFailure,
    Reset,
}

impl SinkState {
    /// Next state for `event`, or `None` when the event is not allowed here
    pub fn on_event(self, event: SinkEvent) -> Option<SinkState> {
        use SinkEvent as E;
        use SinkState as S;

        match (self, event) {
            (_, E::Reset) => Some(S::Idle),
            (_, E::PullFailure) => Some(S::Error),

            (S::Idle, E::Preroll) => Some(S::Negotiating),
            (S::Idle, E::EndOfStream) => Some(S::EndOfStream),
            (S::Idle, E::Negotiated | E::NegotiationFailed | E::Buffer) => None,

            (S::Negotiating, E::Negotiated) => Some(S::Streaming),
            (S::Negotiating, E::NegotiationFailed) => Some(S::Error),
            (S::Negotiating, E::EndOfStream) => Some(S::EndOfStream),
            (S::Negotiating, E::Preroll | E::Buffer) => None,

            // A second preroll follows a flush and carries an ordinary frame
            (S::Streaming, E::Preroll | E::Buffer) => Some(S::Streaming),
            (S::Streaming, E::EndOfStream) => Some(S::EndOfStream),
            (S::Streaming, E::Negotiated | E::NegotiationFailed) => None,

            (S::EndOfStream, E::EndOfStream) => Some(S::EndOfStream),
            (S::EndOfStream, E::Preroll | E::Buffer | E::Negotiated | E::NegotiationFailed) => None,

            (S::Error, E::Preroll | E::Buffer | E::EndOfStream | E::Negotiated | E::NegotiationFailed) => {
                None
            }
        }
    }

    /// True while buffers are stored
    pub fn accepts_buffers(&self) -> bool {
        matches!(self, SinkState::Streaming)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SinkState::Idle => "Idle",
            SinkState::Negotiating => "Negotiating",
            SinkState::Streaming => "Streaming",
            SinkState::EndOfStream => "End of stream",
            SinkState::Error => "Error",
        }
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
