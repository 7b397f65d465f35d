//! Bounded handoff from the MIDI callback context to the engine context.
//!
//! The transport callback only pushes; the engine loop only pops. Overflow
//! drops the newest event and bumps a shared counter so a saturated queue
//! never blocks the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{
    sync_channel, Receiver, RecvError, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Creates a bounded queue, returning the producer and consumer halves.
pub fn bounded<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = sync_channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        QueueProducer {
            tx,
            dropped: Arc::clone(&dropped),
        },
        QueueConsumer { rx, dropped },
    )
}

pub struct QueueProducer<T> {
    tx: SyncSender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        QueueProducer {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> QueueProducer<T> {
    /// Enqueues without blocking. Returns false if the value was dropped,
    /// either because the queue is full or the consumer is gone.
    pub fn push(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Events dropped so far due to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct QueueConsumer<T> {
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> QueueConsumer<T> {
    pub fn recv(&self) -> Result<T, RecvError> {
        self.rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
