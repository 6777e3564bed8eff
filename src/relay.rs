//! Hand-off of incoming MIDI from the device callback threads to the UI thread.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of envelopes that may be in flight before new ones are dropped
pub const DEFAULT_CAPACITY: usize = 1024;

/// One incoming MIDI message, stamped by the platform callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Microseconds, as reported by the MIDI backend
    pub timestamp: u64,
    /// Which input the message came from
    pub source: String,
    /// Raw message bytes
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp as f64 / 1_000_000.0
    }
}

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Producer side. Cheap to clone; one clone lives in each open input callback.
#[derive(Clone)]
pub struct RelaySender {
    tx: Sender<Envelope>,
    dropped: Arc<AtomicU64>,
    waker: Option<Waker>,
}

impl RelaySender {
    /// Run `waker` after every successful push, e.g. to schedule a UI repaint
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    /// Enqueue without blocking. A full or closed relay drops the message.
    pub fn push(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => {
                if let Some(waker) = &self.waker {
                    waker();
                }
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Consumer side, owned by the UI-update context
#[derive(Debug)]
pub struct RelayReceiver {
    rx: Receiver<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for RelaySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySender")
            .field("pending", &self.tx.len())
            .field("has_waker", &self.waker.is_some())
            .finish()
    }
}

impl RelayReceiver {
    /// Deliver every queued envelope in arrival order. Returns how many were delivered.
    pub fn drain(&self, mut deliver: impl FnMut(Envelope)) -> usize {
        let mut count = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            deliver(envelope);
            count += 1;
        }
        count
    }

    /// Total messages lost to a full relay so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub fn relay(capacity: usize) -> (RelaySender, RelayReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RelaySender {
            tx,
            dropped: Arc::clone(&dropped),
            waker: None,
        },
        RelayReceiver { rx, dropped },
    )
}
