//! In-process fan-out hub for real-time news delivery.
//!
//! Each live WebSocket owns a [`Connection`]: a bounded outbound queue plus a
//! `Connecting -> Active -> Closed` state. Connections subscribe to topics;
//! [`StreamHub::broadcast`] serializes a value once and pushes the same text
//! frame to every current subscriber of the topic.
//!
//! # Usage
//!
//! Producers (change relay):
//!   hub.broadcast("rust", &entry).await?;
//!
//! Consumers (WebSocket endpoints):
//!   let (conn, mut rx) = hub.open_connection();
//!   hub.subscribe("rust", conn.clone()).await;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

pub type ConnectionId = u64;

/// Default outbound queue length per connection
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Default upper bound on a single delivery
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// Server side of one subscriber's outbound stream.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    state: AtomicU8,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Connecting -> Active. Returns false once the connection is closed.
    fn activate(&self) -> bool {
        match self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current == ConnectionState::Active as u8,
        }
    }

    /// Terminal. Safe to call repeatedly.
    pub fn close(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Queue one frame. A full queue that does not drain within `timeout`,
    /// or a dropped receiver, is a failed delivery.
    async fn deliver(&self, payload: Arc<str>, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        matches!(
            tokio::time::timeout(timeout, self.tx.send(payload)).await,
            Ok(Ok(()))
        )
    }
}

/// Topic-keyed registry of live connections.
///
/// Thread-safe, cloneable. Delivery runs on a snapshot taken under the read
/// lock, so slow subscribers never hold the lock.
#[derive(Clone)]
pub struct StreamHub {
    topics: Arc<RwLock<HashMap<String, HashMap<ConnectionId, Arc<Connection>>>>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
    send_timeout: Duration,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_limits(buffer: usize, send_timeout: Duration) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
            send_timeout,
        }
    }

    /// Allocate a connection in the `Connecting` state together with the
    /// receiving end of its outbound queue.
    pub fn open_connection(&self) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let connection = Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        };
        (Arc::new(connection), rx)
    }

    /// Register `connection` under `topic` and mark it active.
    ///
    /// Subscribing twice is a no-op. Returns false for a closed connection.
    pub async fn subscribe(&self, topic: &str, connection: Arc<Connection>) -> bool {
        if !connection.activate() {
            return false;
        }

        let mut topics = self.topics.write().await;
        // May have been closed between activation and taking the lock
        if connection.is_closed() {
            return false;
        }
        topics
            .entry(topic.to_string())
            .or_default()
            .insert(connection.id, connection);
        true
    }

    /// Drop `connection` from `topic` and close it. Idempotent; a
    /// connection that is not subscribed to `topic` is left untouched.
    pub async fn unsubscribe(&self, topic: &str, connection: &Connection) {
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            return;
        };
        if subscribers.remove(&connection.id).is_none() {
            return;
        }

        connection.close();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
    }

    /// Push `value` to every subscriber of `topic`.
    ///
    /// Serializes once (pretty JSON). Every subscriber gets an attempt;
    /// those that fail are closed and removed after the pass. Returns the
    /// number of successful deliveries.
    pub async fn broadcast<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<usize> {
        let snapshot: Vec<Arc<Connection>> = {
            let topics = self.topics.read().await;
            match topics.get(topic) {
                Some(subscribers) if !subscribers.is_empty() => {
                    subscribers.values().cloned().collect()
                }
                _ => return Ok(0),
            }
        };

        let payload: Arc<str> = serde_json::to_string_pretty(value)
            .context("Failed to serialize broadcast payload")?
            .into();

        let outcomes = join_all(
            snapshot
                .iter()
                .map(|connection| connection.deliver(payload.clone(), self.send_timeout)),
        )
        .await;

        let failed: Vec<&Arc<Connection>> = snapshot
            .iter()
            .zip(&outcomes)
            .filter(|(_, delivered)| !**delivered)
            .map(|(connection, _)| connection)
            .collect();

        if !failed.is_empty() {
            let mut topics = self.topics.write().await;
            if let Some(subscribers) = topics.get_mut(topic) {
                for connection in &failed {
                    connection.close();
                    subscribers.remove(&connection.id);
                }
                if subscribers.is_empty() {
                    topics.remove(topic);
                }
            }
            tracing::debug!(
                topic,
                removed = failed.len(),
                "Dropped subscribers after failed delivery"
            );
        }

        Ok(snapshot.len() - failed.len())
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = StreamHub::new();
        let (a, mut rx_a) = hub.open_connection();
        let (b, mut rx_b) = hub.open_connection();
        assert!(hub.subscribe("rust", a).await);
        assert!(hub.subscribe("rust", b).await);

        let value = serde_json::json!({"title": "hello"});
        let delivered = hub.broadcast("rust", &value).await.unwrap();

        assert_eq!(delivered, 2);
        let expected = serde_json::to_string_pretty(&value).unwrap();
        assert_eq!(&*rx_a.recv().await.unwrap(), expected);
        assert_eq!(&*rx_b.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_broadcast_is_scoped_to_topic() {
        let hub = StreamHub::new();
        let (conn, mut rx) = hub.open_connection();
        hub.subscribe("rust", conn).await;

        hub.broadcast("go", &serde_json::json!({"x": 1})).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    struct CountingValue(Arc<AtomicUsize>);

    impl Serialize for CountingValue {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            s.serialize_str("counted")
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_skips_serialization() {
        let hub = StreamHub::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let delivered = hub
            .broadcast("nobody", &CountingValue(counter.clone()))
            .await
            .unwrap();

        assert_eq!(delivered, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_serializes_once() {
        let hub = StreamHub::new();
        let (a, _rx_a) = hub.open_connection();
        let (b, _rx_b) = hub.open_connection();
        hub.subscribe("rust", a).await;
        hub.subscribe("rust", b).await;
        let counter = Arc::new(AtomicUsize::new(0));

        hub.broadcast("rust", &CountingValue(counter.clone()))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_removed_others_still_served() {
        let hub = StreamHub::new();
        let (alive, mut rx_alive) = hub.open_connection();
        let (dead, rx_dead) = hub.open_connection();
        hub.subscribe("rust", alive).await;
        hub.subscribe("rust", dead.clone()).await;
        drop(rx_dead);

        let delivered = hub.broadcast("rust", &"entry").await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(hub.subscriber_count("rust").await, 1);
        assert_eq!(dead.state(), ConnectionState::Closed);
        assert!(rx_alive.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_stalled_subscriber_times_out() {
        let hub = StreamHub::with_limits(1, Duration::from_millis(10));
        let (slow, _rx_slow) = hub.open_connection();
        hub.subscribe("rust", slow.clone()).await;

        // First frame fills the queue, second cannot be queued in time
        assert_eq!(hub.broadcast("rust", &1).await.unwrap(), 1);
        assert_eq!(hub.broadcast("rust", &2).await.unwrap(), 0);

        assert!(slow.is_closed());
        assert_eq!(hub.subscriber_count("rust").await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_twice_registers_once() {
        let hub = StreamHub::new();
        let (conn, mut rx) = hub.open_connection();
        hub.subscribe("rust", conn.clone()).await;
        hub.subscribe("rust", conn).await;

        assert_eq!(hub.subscriber_count("rust").await, 1);
        hub.broadcast("rust", &"once").await.unwrap();
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_terminal() {
        let hub = StreamHub::new();
        let (conn, _rx) = hub.open_connection();
        assert_eq!(conn.state(), ConnectionState::Connecting);

        hub.subscribe("rust", conn.clone()).await;
        assert_eq!(conn.state(), ConnectionState::Active);

        hub.unsubscribe("rust", &conn).await;
        hub.unsubscribe("rust", &conn).await;

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(hub.subscriber_count("rust").await, 0);
        assert!(!hub.subscribe("rust", conn).await);
        assert_eq!(hub.subscriber_count("rust").await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_from_other_topic_leaves_connection_alone() {
        let hub = StreamHub::new();
        let (conn, mut rx) = hub.open_connection();
        hub.subscribe("rust", conn.clone()).await;

        hub.unsubscribe("go", &conn).await;

        assert_eq!(conn.state(), ConnectionState::Active);
        assert_eq!(hub.broadcast("rust", &"still here").await.unwrap(), 1);
        assert_eq!(hub.subscriber_count("rust").await, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_rejected() {
        let hub = StreamHub::new();
        let (conn, _rx) = hub.open_connection();
        conn.close();

        assert!(!hub.subscribe("rust", conn.clone()).await);
        assert_eq!(hub.subscriber_count("rust").await, 0);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
