//! In-process publish/subscribe registry keyed by tracking code.
//!
//! ```text
//! Reconciler ── publish(topic, event) ──> NotificationBroker
//!                                           │
//!                      ┌────────────────────┼────────────────────┐
//!                      ▼                    ▼                    ▼
//!                   Sink #1              Sink #2              Sink #3
//!                (live stream)        (live stream)        (live stream)
//! ```
//!
//! Delivery is fire-and-forget. A sink that is full or closed is skipped; it is
//! removed by its own connection teardown, never by the broker. Nothing is
//! queued for absent subscribers and nothing survives a restart: clients
//! re-read authoritative state when they connect.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::PublicStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveEventKind {
    Created,
    Status,
}

/// Payload pushed to live subscribers after a reconciliation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(rename = "type")]
    pub kind: LiveEventKind,
    pub status: PublicStatus,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink buffer is full")]
    Full,
    #[error("sink is closed")]
    Closed,
}

/// A live-delivery endpoint. `send` must never block.
pub trait Sink: Send + Sync {
    fn send(&self, payload: Bytes) -> Result<(), SinkError>;
    fn close(&self);
}

/// Sink backed by a bounded channel; the receiving half feeds a connection.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Sink for ChannelSink {
    fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        let guard = self.tx.lock().map_err(|_| SinkError::Closed)?;
        let tx = guard.as_ref().ok_or(SinkError::Closed)?;
        tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Topic = HashMap<SubscriptionId, Arc<dyn Sink>>;

#[derive(Default)]
pub struct NotificationBroker {
    topics: DashMap<String, Topic>,
    next_id: AtomicU64,
}

impl NotificationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, sink: Arc<dyn Sink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, sink);
        debug!(topic, subscription = id.0, "Live subscriber registered");
        id
    }

    /// Removes the sink; an emptied topic is dropped from the registry.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        if let Some(mut sinks) = self.topics.get_mut(topic) {
            sinks.remove(&id);
        }
        self.topics.remove_if(topic, |_, sinks| sinks.is_empty());
        debug!(topic, subscription = id.0, "Live subscriber removed");
    }

    /// Delivers `event` to every sink currently under `topic`.
    /// Returns how many sinks accepted it.
    pub fn publish(&self, topic: &str, event: &LiveEvent) -> usize {
        let sinks: Vec<Arc<dyn Sink>> = match self.topics.get(topic) {
            Some(sinks) => sinks.values().cloned().collect(),
            None => return 0,
        };

        let payload = match serde_json::to_vec(event) {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                tracing::error!("Failed to serialize live event: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for sink in sinks {
            match sink.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => trace!(topic, error = %e, "Live delivery skipped"),
            }
        }
        delivered
    }

    /// Closes every sink; used on shutdown so open streams end cleanly.
    pub fn close_all(&self) {
        for entry in self.topics.iter() {
            for sink in entry.value().values() {
                sink.close();
            }
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|sinks| sinks.len()).unwrap_or(0)
    }
}

/// Unregisters a subscription when dropped, tying the registry entry to the
/// lifetime of the connection that owns it.
pub struct SubscriptionGuard {
    broker: Arc<NotificationBroker>,
    topic: String,
    id: SubscriptionId,
}

impl SubscriptionGuard {
    pub fn new(broker: Arc<NotificationBroker>, topic: String, id: SubscriptionId) -> Self {
        Self { broker, topic, id }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        received: AtomicUsize,
    }

    impl Sink for CountingSink {
        fn send(&self, _payload: Bytes) -> Result<(), SinkError> {
            self.received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {}
    }

    struct BrokenSink;

    impl Sink for BrokenSink {
        fn send(&self, _payload: Bytes) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }

        fn close(&self) {}
    }

    fn event() -> LiveEvent {
        LiveEvent {
            kind: LiveEventKind::Status,
            status: PublicStatus::Sent,
            label: "Sent to recipient bank".to_string(),
            occurred_at: Utc::now(),
        }
    }

    fn counting() -> Arc<CountingSink> {
        Arc::new(CountingSink::default())
    }

    fn received(sink: &CountingSink) -> usize {
        sink.received.load(Ordering::SeqCst)
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let broker = NotificationBroker::new();
        let sinks = [counting(), counting(), counting()];
        for sink in &sinks {
            broker.subscribe("TRK-1", sink.clone());
        }

        assert_eq!(broker.publish("TRK-1", &event()), 3);
        for sink in &sinks {
            assert_eq!(received(sink), 1);
        }
    }

    #[test]
    fn test_unsubscribed_sink_is_skipped() {
        let broker = NotificationBroker::new();
        let a = counting();
        let b = counting();
        let c = counting();
        broker.subscribe("TRK-1", a.clone());
        let b_id = broker.subscribe("TRK-1", b.clone());
        broker.subscribe("TRK-1", c.clone());

        broker.unsubscribe("TRK-1", b_id);

        assert_eq!(broker.publish("TRK-1", &event()), 2);
        assert_eq!(received(&a), 1);
        assert_eq!(received(&b), 0);
        assert_eq!(received(&c), 1);
    }

    #[test]
    fn test_topics_are_isolated() {
        let broker = NotificationBroker::new();
        let on_b = counting();
        broker.subscribe("B", on_b.clone());

        assert_eq!(broker.publish("A", &event()), 0);
        assert_eq!(received(&on_b), 0);
    }

    #[test]
    fn test_empty_topic_is_reclaimed() {
        let broker = NotificationBroker::new();
        let first = broker.subscribe("TRK-9", counting());
        let second = broker.subscribe("TRK-9", counting());
        assert_eq!(broker.topic_count(), 1);

        broker.unsubscribe("TRK-9", first);
        assert_eq!(broker.subscriber_count("TRK-9"), 1);
        broker.unsubscribe("TRK-9", second);

        assert_eq!(broker.topic_count(), 0);
        // Unsubscribing twice is harmless.
        broker.unsubscribe("TRK-9", second);
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_failing_sink_does_not_stop_others() {
        let broker = NotificationBroker::new();
        let healthy = counting();
        broker.subscribe("TRK-1", Arc::new(BrokenSink));
        broker.subscribe("TRK-1", healthy.clone());

        assert_eq!(broker.publish("TRK-1", &event()), 1);
        assert_eq!(received(&healthy), 1);
        // The broker does not reap failing sinks itself.
        assert_eq!(broker.subscriber_count("TRK-1"), 2);
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let broker = NotificationBroker::new();
        let (sink, mut rx) = ChannelSink::bounded(1);
        broker.subscribe("TRK-1", Arc::new(sink));

        assert_eq!(broker.publish("TRK-1", &event()), 1);
        assert_eq!(broker.publish("TRK-1", &event()), 0);

        let payload = rx.recv().await.unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded["type"], "status");
        assert_eq!(decoded["status"], "SENT");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_all_ends_channel_streams() {
        let broker = NotificationBroker::new();
        let (sink, mut rx) = ChannelSink::bounded(4);
        let sink = Arc::new(sink);
        broker.subscribe("TRK-1", sink.clone());

        broker.close_all();

        assert_eq!(sink.send(Bytes::from_static(b"late")), Err(SinkError::Closed));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_guard_unsubscribes_on_drop() {
        let broker = Arc::new(NotificationBroker::new());
        let id = broker.subscribe("TRK-2", counting());
        {
            let _guard = SubscriptionGuard::new(broker.clone(), "TRK-2".to_string(), id);
            assert_eq!(broker.subscriber_count("TRK-2"), 1);
        }
        assert_eq!(broker.topic_count(), 0);
    }
}
