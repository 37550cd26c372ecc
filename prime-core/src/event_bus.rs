//! Event Bus (C1) — in-process pub/sub fan-out for live WebSocket subscribers.
//!
//! Topics are plain strings (`stream.start`, `node.execution.pending_approval`,
//! …) rather than one fixed enum, because channel adapters, the node runtime,
//! and the gateway all publish heterogeneous payloads. Delivery is
//! at-most-once per subscriber with per-subscriber ordering preserved;
//! publish never blocks — a full subscriber queue drops the event and bumps
//! that subscriber's drop counter. There is no cross-process durability.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// An event published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

struct Subscriber {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

/// A handle returned from [`EventBus::subscribe`].
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Number of events dropped for this subscriber due to a full mailbox.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Process-wide pub/sub bus. Cheap to clone (all state is behind `Arc`).
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
    mailbox_depth: usize,
}

impl EventBus {
    pub fn new(mailbox_depth: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            mailbox_depth,
        }
    }

    /// Subscribe to all topics. Callers filter by `Event::topic` themselves,
    /// matching the teacher's broadcast-then-filter connection pattern.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.mailbox_depth);
        let id = Uuid::new_v4();
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                tx,
                dropped: dropped.clone(),
            },
        );
        Subscription { id, rx, dropped }
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().await.remove(&id);
    }

    /// Publish non-blocking: subscribers whose mailbox is full have the
    /// event dropped and their counter incremented, never block the
    /// publisher.
    pub async fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) {
        let event = Event {
            topic: topic.into(),
            payload,
        };
        let subs = self.subscribers.read().await;
        for sub in subs.values() {
            if sub.tx.try_send(event.clone()).is_err() {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe().await;
        let mut b = bus.subscribe().await;
        bus.publish("stream.start", serde_json::json!({"agent": "A"})).await;
        let ea = a.rx.recv().await.unwrap();
        let eb = b.rx.recv().await.unwrap();
        assert_eq!(ea.topic, "stream.start");
        assert_eq!(eb.topic, "stream.start");
    }

    #[tokio::test]
    async fn per_subscriber_ordering_preserved() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe().await;
        bus.publish("t", serde_json::json!(1)).await;
        bus.publish("t", serde_json::json!(2)).await;
        bus.publish("t", serde_json::json!(3)).await;
        assert_eq!(sub.rx.recv().await.unwrap().payload, serde_json::json!(1));
        assert_eq!(sub.rx.recv().await.unwrap().payload, serde_json::json!(2));
        assert_eq!(sub.rx.recv().await.unwrap().payload, serde_json::json!(3));
    }

    #[tokio::test]
    async fn full_mailbox_drops_and_counts() {
        let bus = EventBus::new(1);
        let sub = bus.subscribe().await;
        bus.publish("t", serde_json::json!(1)).await;
        bus.publish("t", serde_json::json!(2)).await; // mailbox full, dropped
        assert_eq!(sub.dropped_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe().await;
        bus.unsubscribe(sub.id).await;
        assert_eq!(bus.subscriber_count().await, 0);
        // publishing after unsubscribe should not panic or block
        bus.publish("t", serde_json::json!(1)).await;
    }
}
