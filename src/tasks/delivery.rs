use std::sync::Arc;

use tokio::sync::broadcast;

use crate::delivery::{DeliveryEngine, DeliveryReceiver};

/// Drains the delivery queue one message at a time, in enqueue order
pub struct DeliveryWorker {
    engine: Arc<DeliveryEngine>,
    receiver: DeliveryReceiver,
    shutdown: broadcast::Receiver<()>,
}

impl DeliveryWorker {
    pub fn new(
        engine: Arc<DeliveryEngine>,
        receiver: DeliveryReceiver,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            receiver,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Delivery worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Delivery worker received shutdown signal");
                    break;
                }
                next = self.receiver.recv() => {
                    match next {
                        Some(delivery) => {
                            self.engine.deliver(&delivery.record).await;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!("Delivery worker stopped");
    }
}
