//! Graceful shutdown handling for the chat service.
//!
//! Shutdown runs in order:
//! 1. Notify all connected clients about the impending shutdown
//! 2. Wait for queued and in-progress live deliveries to go out
//! 3. Signal background tasks to stop
//! 4. Close the remaining connections

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionManager;
use crate::delivery::DeliveryQueue;
use crate::websocket::ServerMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified
    pub client_notification_timeout: Duration,
    /// Time to wait for the delivery queue to empty
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Handles graceful shutdown of the chat service
pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    delivery_queue: DeliveryQueue,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        delivery_queue: DeliveryQueue,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(
            connection_manager,
            delivery_queue,
            shutdown_tx,
            ShutdownConfig::default(),
        )
    }

    pub fn with_config(
        connection_manager: Arc<ConnectionManager>,
        delivery_queue: DeliveryQueue,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            delivery_queue,
            shutdown_tx,
            config,
        }
    }

    /// Execute the graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.connection_manager.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Draining delivery queue");
        result.queue_drained = self.drain_delivery_queue().await;

        tracing::info!("Phase 3: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 4: Closing connections");
        result.connections_closed = self.close_connections().await;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            queue_drained = result.queue_drained,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, reason: &str) -> usize {
        let connections = self.connection_manager.all_connections();
        let total = connections.len();

        if total == 0 {
            return 0;
        }

        let message = ServerMessage::system(format!("Server shutting down: {}", reason));
        let mut futures = FuturesUnordered::new();
        let mut notified = 0;

        for conn in connections {
            let msg = message.clone();
            futures.push(async move {
                match timeout(Duration::from_secs(2), conn.send(msg)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            error = %e,
                            "Failed to send shutdown notification"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            "Timeout sending shutdown notification"
                        );
                        false
                    }
                }
            });
        }

        let notify_future = async {
            while let Some(success) = futures.next().await {
                if success {
                    notified += 1;
                }
            }
        };

        let _ = timeout(self.config.client_notification_timeout, notify_future).await;

        tracing::info!(notified = notified, total = total, "Shutdown notifications sent");
        notified
    }

    /// Wait until every enqueued delivery has finished, including the one
    /// the worker is currently pushing
    async fn drain_delivery_queue(&self) -> bool {
        if self.delivery_queue.pending() == 0 {
            return true;
        }

        let queue = &self.delivery_queue;
        let drain_future = async {
            while queue.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        match timeout(self.config.drain_timeout, drain_future).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining = self.delivery_queue.pending(),
                    "Delivery queue drain timed out, remaining live deliveries are dropped"
                );
                false
            }
        }
    }

    /// Close every remaining connection; each handler then ends its socket
    async fn close_connections(&self) -> usize {
        let mut closed = 0;
        for conn in self.connection_manager.all_connections() {
            if self.connection_manager.close(&conn).await {
                closed += 1;
            }
        }
        closed
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Number of clients that were notified
    pub clients_notified: usize,
    /// Number of connections closed by the shutdown
    pub connections_closed: usize,
    /// Whether the delivery queue was fully drained
    pub queue_drained: bool,
    pub duration: Duration,
}
