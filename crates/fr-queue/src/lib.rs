//! Delivery queue
//!
//! In-process FIFO work queue feeding a single retry worker. Producers hold a
//! cloneable [`QueueHandle`] and enqueue without blocking; the worker polls
//! the receiving end on a short timeout so it can observe shutdown. Jobs live
//! only in memory: a process restart drops whatever was queued.

use fr_common::{DeliveryJob, FormRelayError, Result};
use tokio::sync::mpsc;
use tracing::debug;

pub mod backoff;
pub mod worker;

pub use backoff::{backoff_delay, BACKOFF_FLOOR};
pub use worker::{DeliveryWorker, WorkerConfig, WorkerHandle};

/// Owned queue component. Construct one per process, hand clones of its
/// [`QueueHandle`] to producers and its receiver to the worker.
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
    rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<DeliveryJob>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
        }
    }

    /// Take the consuming end. Yields once; the queue has a single consumer.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<DeliveryJob>> {
        self.rx.lock().take()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer side of the delivery queue.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl QueueHandle {
    /// Enqueue a job at the tail. Never blocks the caller.
    pub fn enqueue(&self, job: DeliveryJob) -> Result<()> {
        debug!(
            recipients = job.recipients.len(),
            attempts = job.attempts,
            "Enqueueing delivery job"
        );
        self.tx
            .send(job)
            .map_err(|_| FormRelayError::Queue("Queue receiver dropped".to_string()))
    }
}
