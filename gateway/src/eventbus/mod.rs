//! In-process topic→subscribers event bus (spec.md §4.10). Bounded
//! per-subscriber queues; publish is non-blocking and drops on
//! backpressure rather than stalling the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum Event {
    SessionStart { session_id: String },
    SessionStop { session_id: String },
    HardReset { session_id: String, reason: String },
}

pub struct EventBus {
    subscribers: RwLock<FxHashMap<String, Vec<mpsc::Sender<Event>>>>,
    drops: RwLock<FxHashMap<String, AtomicU64>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, topic: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().entry(topic.to_string()).or_default().push(tx);
        rx
    }

    /// Non-blocking publish: drops for any subscriber whose queue is full,
    /// incrementing `bus_drops_total{topic}`.
    pub fn publish(&self, topic: &str, event: Event) {
        let subs = self.subscribers.read();
        let Some(senders) = subs.get(topic) else { return };

        for sender in senders {
            if sender.try_send(event.clone()).is_err() {
                self.drops
                    .write()
                    .entry(topic.to_string())
                    .or_insert_with(|| AtomicU64::new(0))
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn drops_for(&self, topic: &str) -> u64 {
        self.drops
            .read()
            .get(topic)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Drop senders whose receivers have gone away, so future publishes
    /// don't pay the try_send cost for dead subscribers.
    pub fn prune(&self, topic: &str) {
        if let Some(senders) = self.subscribers.write().get_mut(topic) {
            senders.retain(|s| !s.is_closed());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(FxHashMap::default()),
            drops: RwLock::new(FxHashMap::default()),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("session.start");
        bus.publish("session.start", Event::SessionStart { session_id: "s1".into() });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::SessionStart { .. }));
    }

    #[tokio::test]
    async fn full_queue_increments_drop_counter_instead_of_blocking() {
        let bus = EventBus::new();
        let _rx = bus.subscribe("t");
        for _ in 0..DEFAULT_CAPACITY + 5 {
            bus.publish("t", Event::SessionStop { session_id: "s".into() });
        }
        assert!(bus.drops_for("t") > 0);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nobody-listening", Event::SessionStop { session_id: "s".into() });
        assert_eq!(bus.drops_for("nobody-listening"), 0);
    }
}
