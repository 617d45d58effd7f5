//! Frame sink
//!
//! Producer-side endpoint. Runs on the decode thread: negotiates the frame
//! dimensions from the first buffer, stores every accepted buffer into the
//! shared slot and asks the render surface to repaint. Nothing in here waits
//! on the consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::frame::{FrameBuffer, FrameSize, FrameSlot, PixelFormat};
use crate::pipeline::{Caps, FlowStatus, PipelineCallbacks, Sample, RAW_RGB};
use crate::scheduler::Scheduler;

use super::error::{NegotiationError, SinkError};
use super::state::{SinkEvent, SinkState};

/// Counters exposed for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkStats {
    /// Buffers stored into the slot
    pub accepted: u64,
    /// Buffers discarded because of an error
    pub rejected: u64,
}

/// Pipeline-facing frame sink
pub struct FrameSink {
    slot: Arc<FrameSlot>,
    scheduler: Scheduler,
    /// The one layout this sink accepts
    format: PixelFormat,
    state: Mutex<SinkState>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl FrameSink {
    /// Create a sink accepting [`PixelFormat::BGRX`] frames
    pub fn new(slot: Arc<FrameSlot>, scheduler: Scheduler) -> Self {
        Self::with_format(slot, scheduler, PixelFormat::BGRX)
    }

    pub fn with_format(slot: Arc<FrameSlot>, scheduler: Scheduler, format: PixelFormat) -> Self {
        Self {
            slot,
            scheduler,
            format,
            state: Mutex::new(SinkState::Idle),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Caps advertised to the pipeline
    pub fn caps(&self) -> Caps {
        Caps::sink_template(self.format)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn state(&self) -> SinkState {
        *self.state.lock()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn negotiated_size(&self) -> Option<FrameSize> {
        self.slot.negotiated_size()
    }

    /// First buffer of a stream, or the first one after a flush
    pub fn on_preroll(&self, buffer: FrameBuffer, caps: &Caps) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let current = *state;

        let Some(next) = current.on_event(SinkEvent::Preroll) else {
            drop(state);
            return Err(self.reject(SinkError::UnexpectedPreroll { state: current }));
        };

        if current == SinkState::Streaming {
            drop(state);
            if let Err(e) = self.check_renegotiation(caps) {
                return Err(self.reject(e));
            }
            return self.accept(buffer);
        }

        *state = next;
        match self.negotiate(&buffer, caps) {
            Ok(size) => {
                *state = next
                    .on_event(SinkEvent::Negotiated)
                    .unwrap_or(SinkState::Streaming);
                drop(state);
                info!("FrameSink: negotiated {} ({})", size, caps);
                self.publish(buffer);
                Ok(())
            }
            Err(e) => {
                *state = next
                    .on_event(SinkEvent::NegotiationFailed)
                    .unwrap_or(SinkState::Error);
                drop(state);
                self.fall_back();
                Err(self.reject(e.into()))
            }
        }
    }

    /// Steady-state buffer
    pub fn on_buffer(&self, buffer: FrameBuffer) -> Result<(), SinkError> {
        let state = self.state();
        if state.on_event(SinkEvent::Buffer).is_none() {
            return Err(self.reject(SinkError::UnexpectedBuffer { state }));
        }
        self.accept(buffer)
    }

    /// The pipeline reached the end of the stream
    pub fn on_end_of_stream(&self) {
        let mut state = self.state.lock();
        match state.on_event(SinkEvent::EndOfStream) {
            Some(next) => {
                *state = next;
                info!("FrameSink: end of stream");
            }
            None => debug!("FrameSink: end of stream ignored while {}", *state),
        }
        drop(state);
        self.scheduler.notify();
    }

    /// The pipeline announced a buffer it could not deliver
    pub fn on_pull_failure(&self) {
        let mut state = self.state.lock();
        *state = state.on_event(SinkEvent::PullFailure).unwrap_or(SinkState::Error);
        drop(state);
        warn!("FrameSink: {}", SinkError::PullFailure);
        self.fall_back();
    }

    /// Return to Idle so a new preroll can start the stream again
    ///
    /// The slot keeps its last frame and its negotiated dimensions.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let previous = *state;
        *state = previous.on_event(SinkEvent::Reset).unwrap_or(SinkState::Idle);
        if previous != SinkState::Idle {
            info!("FrameSink: reset from {}", previous);
        }
    }

    fn negotiate(&self, buffer: &FrameBuffer, caps: &Caps) -> Result<FrameSize, NegotiationError> {
        if !caps.is_fixed() {
            return Err(NegotiationError::NotFixed(caps.to_string()));
        }
        if caps.media_type() != RAW_RGB {
            return Err(NegotiationError::MediaType(caps.media_type().to_string()));
        }

        let size = caps.frame_size().ok_or(NegotiationError::MissingDimensions)?;

        // Masks are optional in the caps; when absent the buffer's own layout must match
        let format = caps.pixel_format().unwrap_or(buffer.format());
        if format != self.format || buffer.format() != self.format {
            return Err(NegotiationError::Format(format));
        }

        if buffer.size() != size {
            return Err(NegotiationError::BufferSize {
                buffer: buffer.size(),
                caps: size,
            });
        }

        self.slot
            .negotiate(size)
            .map_err(|negotiated| NegotiationError::AlreadyNegotiated {
                negotiated,
                requested: size,
            })
    }

    fn check_renegotiation(&self, caps: &Caps) -> Result<(), SinkError> {
        if !caps.is_fixed() {
            return Err(SinkError::RenegotiationRejected(format!(
                "caps not fixed: {}",
                caps
            )));
        }

        let requested = caps.frame_size().ok_or_else(|| {
            SinkError::RenegotiationRejected("no frame dimensions available".to_string())
        })?;

        match self.slot.negotiated_size() {
            Some(negotiated) if negotiated != requested => Err(SinkError::RenegotiationRejected(
                format!("{} -> {}", negotiated, requested),
            )),
            _ => Ok(()),
        }
    }

    fn accept(&self, buffer: FrameBuffer) -> Result<(), SinkError> {
        if let Some(expected) = self.slot.negotiated_size() {
            if buffer.size() != expected {
                return Err(self.reject(SinkError::BufferSize {
                    expected,
                    actual: buffer.size(),
                }));
            }
        }
        if buffer.format() != self.format {
            return Err(self.reject(SinkError::BufferFormat {
                expected: self.format,
                actual: buffer.format(),
            }));
        }

        self.publish(buffer);
        Ok(())
    }

    fn publish(&self, buffer: FrameBuffer) {
        let generation = self.slot.store(&buffer);
        drop(buffer);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        let notify = self.scheduler.notify();
        trace!(generation, ?notify, "FrameSink: frame stored");
    }

    /// Errors show the background until the stream is reset
    fn fall_back(&self) {
        self.slot.clear();
        self.scheduler.notify();
    }

    fn reject(&self, err: SinkError) -> SinkError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!("FrameSink: {}", err);
        err
    }
}

impl PipelineCallbacks for FrameSink {
    fn eos(&self) {
        self.on_end_of_stream();
    }

    fn new_preroll(&self, sample: Option<Sample>) -> FlowStatus {
        let Some(sample) = sample else {
            self.on_pull_failure();
            return SinkError::PullFailure.flow_status();
        };
        flow_status(self.on_preroll(sample.buffer, &sample.caps))
    }

    fn new_buffer(&self, sample: Option<Sample>) -> FlowStatus {
        let Some(sample) = sample else {
            self.on_pull_failure();
            return SinkError::PullFailure.flow_status();
        };
        flow_status(self.on_buffer(sample.buffer))
    }

    fn flush(&self) {
        self.reset();
    }
}

fn flow_status(result: Result<(), SinkError>) -> FlowStatus {
    match result {
        Ok(()) => FlowStatus::Ok,
        Err(e) => e.flow_status(),
    }
}
