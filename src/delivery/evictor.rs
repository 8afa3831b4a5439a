use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::metrics::DeliveryMetrics;

/// Receiving end drained by the eviction worker
pub type EvictionReceiver = mpsc::UnboundedReceiver<Arc<ConnectionHandle>>;

/// Hands connections whose push failed to the eviction worker.
///
/// Callers never close connections themselves; they may be iterating a
/// snapshot of the tables that a close would mutate.
#[derive(Clone)]
pub struct Evictor {
    sender: mpsc::UnboundedSender<Arc<ConnectionHandle>>,
}

impl Evictor {
    pub fn channel() -> (Self, EvictionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Flag a connection for removal. Only the first report for a connection
    /// is queued; returns whether this call was it.
    pub fn evict(&self, conn: Arc<ConnectionHandle>, reason: &'static str) -> bool {
        if !conn.mark_for_eviction() {
            return false;
        }

        tracing::warn!(
            connection_id = %conn.id,
            user_id = %conn.user_id,
            reason = reason,
            "Flagging connection for removal"
        );
        DeliveryMetrics::record_eviction(reason);

        if self.sender.send(conn).is_err() {
            tracing::debug!("Eviction worker is not running");
        }
        true
    }
}
