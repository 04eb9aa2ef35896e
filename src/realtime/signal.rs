//! # Change Signals
//!
//! Payload-less wakeups meaning "the watched collections may have changed".
//!
//! The source buffers a bounded number of pending signals. A signal raised
//! while the buffer is full is folded into the ones already pending: each of
//! those will start a refresh after it was raised, so no change is ever
//! left without a refresh that observes it. Folded signals are still
//! counted and reported by the next [`ChangeSignals::next`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

/// An opaque change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSignal;

/// Create a connected signal sender/source pair.
///
/// `capacity` is clamped to at least one pending signal.
pub fn channel(capacity: usize) -> (SignalSender, ChangeSignals) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let folded = Arc::new(AtomicUsize::new(0));
    (
        SignalSender {
            tx,
            folded: Arc::clone(&folded),
        },
        ChangeSignals { rx, folded },
    )
}

/// Producer side, held by whatever receives notifications from the store.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<ChangeSignal>,
    folded: Arc<AtomicUsize>,
}

impl SignalSender {
    /// Raise a signal without waiting.
    ///
    /// Returns `false` once the source has been dropped.
    pub fn raise(&self) -> bool {
        match self.tx.try_send(ChangeSignal) {
            Ok(()) => true,
            // A refresh is already pending and will observe this change.
            Err(TrySendError::Full(_)) => {
                self.folded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Whether the consuming side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side. Exactly one exists per listener and it is owned by the
/// relay loop.
#[derive(Debug)]
pub struct ChangeSignals {
    rx: mpsc::Receiver<ChangeSignal>,
    /// Signals raised while the buffer was full
    folded: Arc<AtomicUsize>,
}

impl ChangeSignals {
    /// Wait for the next signal, absorbing any that are already queued.
    ///
    /// Returns how many signals were absorbed, including those folded into a
    /// full buffer, or `None` once every sender is gone and the queue is
    /// empty.
    pub async fn next(&mut self) -> Option<usize> {
        self.rx.recv().await?;

        let mut absorbed = 1;
        while self.rx.try_recv().is_ok() {
            absorbed += 1;
        }
        Some(absorbed + self.folded.swap(0, Ordering::Relaxed))
    }
}
