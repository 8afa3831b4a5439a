use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::connection_manager::{ConnectionHandle, ConnectionManager, PushError};
use crate::metrics::DeliveryMetrics;
use crate::store::{MessageRecord, MessageTarget};
use crate::websocket::{OutboundMessage, ServerMessage};

use super::Evictor;

/// Result of a delivery attempt
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub message_id: Uuid,
    /// Number of connections the message was pushed to
    pub delivered_to: usize,
    /// Number of connections whose push failed
    pub failed: usize,
}

impl DeliveryResult {
    fn new(message_id: Uuid, delivered: usize, failed: usize) -> Self {
        Self {
            message_id,
            delivered_to: delivered,
            failed,
        }
    }
}

/// Statistics for the delivery engine
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub total_messages: AtomicU64,
    pub space_messages: AtomicU64,
    pub direct_messages: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub connections_evicted: AtomicU64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            total_messages: self.total_messages.load(Ordering::Relaxed),
            space_messages: self.space_messages.load(Ordering::Relaxed),
            direct_messages: self.direct_messages.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of delivery statistics
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub total_messages: u64,
    pub space_messages: u64,
    pub direct_messages: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub connections_evicted: u64,
}

/// Pushes persisted messages to the live connections that should see them
pub struct DeliveryEngine {
    connection_manager: Arc<ConnectionManager>,
    send_timeout: Duration,
    max_concurrent_sends: usize,
    evictor: Evictor,
    stats: DeliveryStats,
}

impl DeliveryEngine {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        config: &DeliveryConfig,
        evictor: Evictor,
    ) -> Self {
        Self {
            connection_manager,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
            evictor,
            stats: DeliveryStats::default(),
        }
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver a persisted message.
    ///
    /// - Space message: every connection subscribed to the space
    /// - Direct message: every connection of the recipient and of the sender
    ///
    /// Each connection receives at most one copy. Push failures are isolated
    /// and hand the connection to the eviction channel.
    #[tracing::instrument(
        name = "delivery.deliver",
        skip(self, record),
        fields(message_id = %record.id, sender_id = %record.sender_id)
    )]
    pub async fn deliver(&self, record: &MessageRecord) -> DeliveryResult {
        let Some(target) = record.target() else {
            tracing::warn!(
                message_id = %record.id,
                "Message does not have exactly one target, skipping live delivery"
            );
            return DeliveryResult::new(record.id, 0, 0);
        };

        let start = Instant::now();
        let connections = self.resolve_targets(record.sender_id, target);

        let frame = ServerMessage::Message {
            message: record.clone(),
        };
        let outbound = match OutboundMessage::preserialized(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                OutboundMessage::Raw(frame)
            }
        };

        let (delivered, failed) = self.push_all(&connections, outbound).await;

        self.stats.total_messages.fetch_add(1, Ordering::Relaxed);
        self.stats.total_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.total_failed.fetch_add(failed as u64, Ordering::Relaxed);
        match target {
            MessageTarget::Space(_) => self.stats.space_messages.fetch_add(1, Ordering::Relaxed),
            MessageTarget::Direct(_) => self.stats.direct_messages.fetch_add(1, Ordering::Relaxed),
        };

        DeliveryMetrics::record_sent(target.kind());
        DeliveryMetrics::record_delivered(delivered as u64);
        DeliveryMetrics::record_failed(failed as u64);
        DeliveryMetrics::record_latency(start.elapsed().as_secs_f64());

        tracing::debug!(
            message_id = %record.id,
            target = target.kind(),
            delivered = delivered,
            failed = failed,
            "Delivered message"
        );

        DeliveryResult::new(record.id, delivered, failed)
    }

    /// Snapshot the target set, one entry per connection
    fn resolve_targets(&self, sender_id: Uuid, target: MessageTarget) -> Vec<Arc<ConnectionHandle>> {
        match target {
            MessageTarget::Space(space_id) => self.connection_manager.space_connections(space_id),
            MessageTarget::Direct(recipient_id) => {
                let mut seen = HashSet::new();
                self.connection_manager
                    .user_connections(recipient_id)
                    .into_iter()
                    .chain(self.connection_manager.user_connections(sender_id))
                    .filter(|conn| seen.insert(conn.id))
                    .collect()
            }
        }
    }

    /// Push to every connection concurrently with bounded parallelism.
    /// Each push runs under its own timeout.
    async fn push_all(&self, connections: &[Arc<ConnectionHandle>], outbound: OutboundMessage) -> (usize, usize) {
        if connections.is_empty() {
            return (0, 0);
        }

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;

        for conn in connections {
            let conn = conn.clone();
            let msg = outbound.clone();
            let budget = self.send_timeout;
            futures.push(async move {
                let result = conn.push(msg, budget).await;
                (conn, result)
            });

            while futures.len() >= self.max_concurrent_sends {
                match futures.next().await {
                    Some(outcome) => self.record_outcome(outcome, &mut delivered, &mut failed),
                    None => break,
                }
            }
        }

        while let Some(outcome) = futures.next().await {
            self.record_outcome(outcome, &mut delivered, &mut failed);
        }

        (delivered, failed)
    }

    fn record_outcome(
        &self,
        (conn, result): (Arc<ConnectionHandle>, Result<(), PushError>),
        delivered: &mut usize,
        failed: &mut usize,
    ) {
        match result {
            Ok(()) => *delivered += 1,
            Err(error) => {
                *failed += 1;
                self.evict(conn, error);
            }
        }
    }

    /// Flag a connection once and hand it to the eviction worker
    fn evict(&self, conn: Arc<ConnectionHandle>, error: PushError) {
        if self.evictor.evict(conn, error.label()) {
            self.stats.connections_evicted.fetch_add(1, Ordering::Relaxed);
        }
    }
}
