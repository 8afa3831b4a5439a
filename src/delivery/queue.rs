use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::metrics::DeliveryMetrics;
use crate::store::MessageRecord;

/// Hand-off between message-send requests and the delivery worker.
///
/// Enqueueing never blocks the request. Records are delivered in the order
/// they were enqueued, which is the order they were persisted.
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<MessageRecord>,
    outstanding: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
}

/// Worker side of the queue
pub struct DeliveryReceiver {
    receiver: mpsc::Receiver<MessageRecord>,
    outstanding: Arc<AtomicUsize>,
}

/// A dequeued record. It counts as outstanding until dropped, so a drain
/// waits for the delivery in progress as well as the queued ones.
pub struct PendingDelivery {
    pub record: MessageRecord,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for PendingDelivery {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DeliveryReceiver {
    pub async fn recv(&mut self) -> Option<PendingDelivery> {
        let record = self.receiver.recv().await?;
        Some(PendingDelivery {
            record,
            outstanding: self.outstanding.clone(),
        })
    }
}

impl DeliveryQueue {
    /// Create a queue and the receiver its worker drains
    pub fn new(capacity: usize) -> (Self, DeliveryReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let queue = Self {
            sender,
            outstanding: outstanding.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (queue, DeliveryReceiver { receiver, outstanding })
    }

    /// Queue a persisted message for live delivery.
    /// Returns false if the live delivery was dropped.
    pub fn enqueue(&self, record: MessageRecord) -> bool {
        // Counted before the send so the worker can never decrement first
        self.outstanding.fetch_add(1, Ordering::AcqRel);

        let (record, reason) = match self.sender.try_send(record) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                DeliveryMetrics::record_queue_dropped();
                (record, "Delivery queue full, dropping live delivery")
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                (record, "Delivery worker stopped, dropping live delivery")
            }
        };

        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(message_id = %record.id, "{}", reason);
        false
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deliveries queued or being delivered
    pub fn pending(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}
