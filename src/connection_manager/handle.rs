//! Connection handle and lifecycle state

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Lifecycle of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    /// Terminal
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Why a push to a single connection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out")]
    TimedOut,
}

impl PushError {
    /// Metric and log label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: Uuid,
    sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity (Unix seconds)
    last_activity: AtomicI64,
    state: AtomicU8,
    eviction_requested: AtomicBool,
    close_signal: Notify,
    /// Spaces this connection is subscribed to. Only mutated by
    /// `SubscriptionTable`, always together with the table itself.
    pub(super) subscriptions: Mutex<HashSet<Uuid>>,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            eviction_requested: AtomicBool::new(false),
            close_signal: Notify::new(),
            subscriptions: Mutex::new(HashSet::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Connecting -> Open. Returns false if the connection was not connecting.
    pub(super) fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to Closed. Only the first caller gets `true`.
    pub(super) fn try_close(&self) -> bool {
        let previous = self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if previous == ConnectionState::Closed as u8 {
            return false;
        }
        // Wakes every `closed()` future created before this point
        self.close_signal.notify_waiters();
        true
    }

    /// Resolves once the connection has been closed by any path
    pub async fn closed(&self) {
        let notified = self.close_signal.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Flag the connection for asynchronous removal. Only the first call
    /// returns true so each broken connection is reported once.
    pub fn mark_for_eviction(&self) -> bool {
        !self.eviction_requested.swap(true, Ordering::AcqRel)
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Send a ServerMessage (serialized by the connection writer)
    pub async fn send(&self, message: ServerMessage) -> Result<(), PushError> {
        self.sender
            .send(OutboundMessage::Raw(message))
            .await
            .map_err(|_| PushError::Closed)
    }

    /// Push a frame within the given time budget
    pub async fn push(&self, message: OutboundMessage, budget: Duration) -> Result<(), PushError> {
        match tokio::time::timeout(budget, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PushError::Closed),
            Err(_) => Err(PushError::TimedOut),
        }
    }

    /// Spaces the connection is currently subscribed to
    pub async fn subscribed_spaces(&self) -> Vec<Uuid> {
        self.subscriptions.lock().await.iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_with_buffer(buffer: usize) -> (ConnectionHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[test]
    fn test_state_transitions() {
        let (handle, _rx) = handle_with_buffer(1);
        assert_eq!(handle.state(), ConnectionState::Connecting);

        assert!(handle.mark_open());
        assert!(!handle.mark_open());
        assert_eq!(handle.state(), ConnectionState::Open);

        assert!(handle.try_close());
        assert!(!handle.try_close());
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!handle.mark_open());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (handle, _rx) = handle_with_buffer(1);
        handle.mark_open();
        handle.try_close();

        tokio::time::timeout(Duration::from_millis(100), handle.closed())
            .await
            .expect("closed() should resolve for a closed connection");
    }

    #[tokio::test]
    async fn test_push_times_out_when_buffer_full() {
        let (handle, _rx) = handle_with_buffer(1);

        handle
            .push(OutboundMessage::Ping, Duration::from_millis(50))
            .await
            .unwrap();
        let result = handle
            .push(OutboundMessage::Ping, Duration::from_millis(50))
            .await;

        assert_eq!(result, Err(PushError::TimedOut));
    }

    #[tokio::test]
    async fn test_push_to_dropped_receiver_is_closed() {
        let (handle, rx) = handle_with_buffer(1);
        drop(rx);

        let result = handle
            .push(OutboundMessage::Ping, Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(PushError::Closed));
    }

    #[test]
    fn test_eviction_flag_is_one_shot() {
        let (handle, _rx) = handle_with_buffer(1);
        assert!(handle.mark_for_eviction());
        assert!(!handle.mark_for_eviction());
    }
}
