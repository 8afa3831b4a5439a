use std::sync::Arc;

use tokio::sync::broadcast;

use crate::connection_manager::ConnectionManager;
use crate::delivery::EvictionReceiver;

/// Removes connections flagged by a failed push or ping.
///
/// Closing wakes the connection's handler, which then stops its socket tasks.
pub struct EvictionWorker {
    connection_manager: Arc<ConnectionManager>,
    receiver: EvictionReceiver,
    shutdown: broadcast::Receiver<()>,
}

impl EvictionWorker {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        receiver: EvictionReceiver,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            connection_manager,
            receiver,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Eviction worker received shutdown signal");
                    break;
                }
                next = self.receiver.recv() => {
                    let Some(handle) = next else { break };
                    if self.connection_manager.close(&handle).await {
                        tracing::debug!(
                            connection_id = %handle.id,
                            "Evicted unresponsive connection"
                        );
                    }
                }
            }
        }

        tracing::info!("Eviction worker stopped");
    }
}
