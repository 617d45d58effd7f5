//! Repaint scheduler
//!
//! Carries "a new frame is ready" from the decode thread to the UI thread.
//! The channel holds at most one request, so repeated notifications before the
//! UI gets around to painting collapse into one. The receiving end belongs to
//! the render surface; once it is dropped every notification is discarded.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Hook that wakes the UI event loop (e.g. `egui::Context::request_repaint`)
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// One pending repaint request
#[derive(Debug, Clone, Copy)]
pub struct RepaintRequest {
    pub requested_at: Instant,
}

/// Outcome of [`Scheduler::notify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// A new request is now pending
    Posted,
    /// A request was already pending
    Coalesced,
    /// The surface is gone
    Dropped,
}

/// Producer side of the repaint channel
#[derive(Clone)]
pub struct Scheduler {
    tx: Sender<RepaintRequest>,
    waker: Option<Waker>,
    surface: Weak<()>,
}

/// Consumer side of the repaint channel
pub struct RepaintReceiver {
    rx: Receiver<RepaintRequest>,
    _alive: Arc<()>,
}

/// Create a connected scheduler/receiver pair
pub fn channel(waker: Option<Waker>) -> (Scheduler, RepaintReceiver) {
    let (tx, rx) = bounded(1);
    let alive = Arc::new(());
    let scheduler = Scheduler {
        tx,
        waker,
        surface: Arc::downgrade(&alive),
    };
    (scheduler, RepaintReceiver { rx, _alive: alive })
}

impl Scheduler {
    /// A scheduler with nobody listening
    pub fn detached() -> Self {
        channel(None).0
    }

    /// Request a repaint without blocking
    pub fn notify(&self) -> Notify {
        let request = RepaintRequest {
            requested_at: Instant::now(),
        };
        match self.tx.try_send(request) {
            Ok(()) => {
                if let Some(waker) = &self.waker {
                    waker();
                }
                Notify::Posted
            }
            Err(TrySendError::Full(_)) => Notify::Coalesced,
            Err(TrySendError::Disconnected(_)) => Notify::Dropped,
        }
    }

    /// True while the receiving surface is alive
    pub fn is_connected(&self) -> bool {
        self.surface.strong_count() > 0
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &!self.tx.is_empty())
            .field("connected", &self.is_connected())
            .field("waker", &self.waker.is_some())
            .finish()
    }
}

impl RepaintReceiver {
    /// Consume the pending request, if any
    pub fn take(&self) -> Option<RepaintRequest> {
        self.rx.try_recv().ok()
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}
