//! Bounded FIFO between the network callback and the processing task.
//!
//! The callback side pushes with a deadline and drops the event when the
//! queue stays full. The processing side pops with a deadline so it can
//! check the connection and session watchdog between events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::warn;

use crate::event::Event;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Creates a bounded event queue.
///
/// A capacity of zero is raised to one.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            dropped: dropped.clone(),
        },
        EventReceiver {
            rx,
            dropped,
            closed: false,
        },
    )
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Enqueues an event, waiting at most `timeout` for space.
    ///
    /// Returns false when the event was dropped; it is released here.
    pub async fn push(&self, event: Event, timeout: Duration) -> bool {
        match self.tx.send_timeout(event, timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(event)) => {
                self.record_drop(&event, "queue full");
                false
            }
            Err(SendTimeoutError::Closed(event)) => {
                self.record_drop(&event, "queue closed");
                false
            }
        }
    }

    /// Enqueues without waiting.
    pub fn try_push(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.record_drop(&event, "queue full");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.record_drop(&event, "queue closed");
                false
            }
        }
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, event: &Event, reason: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("dropping {} event: {}", event.kind(), reason);
    }
}

/// Consumer half. Owned by the processing task.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
    closed: bool,
}

impl EventReceiver {
    /// Waits at most `timeout` for the next event.
    pub async fn pop(&mut self, timeout: Duration) -> Option<Event> {
        if self.closed {
            return None;
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    /// True once every sender is gone and the queue has drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of events dropped by producers so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
