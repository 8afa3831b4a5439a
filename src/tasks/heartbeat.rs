//! Connection liveness.
//!
//! Every `heartbeat_interval` each connection is sent a WebSocket ping.
//! Clients answer with a pong, which refreshes the connection's activity, so
//! a client that only listens stays connected. A ping that cannot be queued
//! within `ping_timeout_ms` hands the connection to the eviction worker.
//! Every `cleanup_interval` the sweep closes connections that sent no frame
//! and no pong for `connection_timeout` seconds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::config::WebSocketConfig;
use crate::connection_manager::{ConnectionHandle, ConnectionManager, PushError};
use crate::delivery::Evictor;
use crate::metrics::{ConnectionMetrics, HeartbeatMetrics};
use crate::websocket::OutboundMessage;

/// Pings in flight at once during a round
const PING_CONCURRENCY: usize = 512;

pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    evictor: Evictor,
    shutdown: broadcast::Receiver<()>,
}

/// Outcome of one ping round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingRound {
    pub pinged: usize,
    pub timed_out: usize,
    /// Connections newly handed to the eviction worker
    pub evicted: usize,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        evictor: Evictor,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            evictor,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut ping_timer =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval.max(1)));
        let mut sweep_timer =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval.max(1)));
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Both intervals fire immediately on the first tick
        ping_timer.tick().await;
        sweep_timer.tick().await;

        tracing::info!(
            ping_interval_secs = self.config.heartbeat_interval,
            sweep_interval_secs = self.config.cleanup_interval,
            idle_limit_secs = self.config.connection_timeout,
            "Liveness task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Liveness task received shutdown signal");
                    break;
                }
                _ = ping_timer.tick() => {
                    self.ping_all().await;
                }
                _ = sweep_timer.tick() => {
                    self.sweep_idle().await;
                }
            }
        }

        tracing::info!("Liveness task stopped");
    }

    /// Queue a ping on every live connection
    pub(crate) async fn ping_all(&self) -> PingRound {
        let connections = self.connection_manager.all_connections();
        ConnectionMetrics::update(&self.connection_manager.stats());

        if connections.is_empty() {
            return PingRound::default();
        }

        let start = Instant::now();
        let budget = Duration::from_millis(self.config.ping_timeout_ms);
        let mut round = PingRound::default();
        let mut futures = FuturesUnordered::new();

        for conn in connections {
            futures.push(async move {
                let result = conn.push(OutboundMessage::Ping, budget).await;
                (conn, result)
            });

            while futures.len() >= PING_CONCURRENCY {
                match futures.next().await {
                    Some(outcome) => self.record_ping(outcome, &mut round),
                    None => break,
                }
            }
        }

        while let Some(outcome) = futures.next().await {
            self.record_ping(outcome, &mut round);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;

        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        if round.timed_out > 0 {
            HeartbeatMetrics::record_timeouts(round.timed_out as u64);
        }

        tracing::debug!(
            pinged = round.pinged,
            timed_out = round.timed_out,
            evicted = round.evicted,
            elapsed_ms = elapsed_ms,
            "Ping round completed"
        );

        round
    }

    fn record_ping(
        &self,
        (conn, result): (Arc<ConnectionHandle>, Result<(), PushError>),
        round: &mut PingRound,
    ) {
        let error = match result {
            Ok(()) => {
                round.pinged += 1;
                return;
            }
            Err(error) => error,
        };

        let reason = match error {
            PushError::Closed => "ping_closed",
            PushError::TimedOut => {
                round.timed_out += 1;
                "ping_timed_out"
            }
        };
        if self.evictor.evict(conn, reason) {
            round.evicted += 1;
        }
    }

    /// Close connections that stopped answering pings
    pub(crate) async fn sweep_idle(&self) -> usize {
        let idle_limit = self.config.connection_timeout;
        let closed = self
            .connection_manager
            .cleanup_stale_connections(idle_limit)
            .await;

        if closed > 0 {
            tracing::info!(
                closed = closed,
                idle_limit_secs = idle_limit,
                "Closed connections with no activity"
            );
        }
        closed
    }
}
