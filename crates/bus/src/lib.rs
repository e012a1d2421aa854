//! In-process publish/subscribe event broker.
//!
//! Producers publish to named topics; every subscriber owns a bounded
//! FIFO queue. A full queue drops the message for that subscriber only
//! (counted), so one slow consumer never stalls the others and `publish`
//! never blocks the caller.

pub mod event;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

pub use event::{BusEvent, GraphChange, ResponseEvent};

/// Flow events from the source adapters.
pub const TOPIC_TRAFFIC: &str = "sh.telemetry.traffic.v1";
/// Alerts emitted by the analyzer.
pub const TOPIC_ALERTS: &str = "sh.alerts.v1";
/// Node/edge upsert notifications.
pub const TOPIC_GRAPH_CHANGES: &str = "sh.graph_changes.v1";
/// Response-manager feedback (blocked / expired / unblocked).
pub const TOPIC_RESPONSES: &str = "sh.responses.v1";

pub const DEFAULT_QUEUE_CAPACITY: usize = 4_096;

/// Handle returned by `subscribe*`; pass to [`Broker::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    id: u64,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<BusEvent>>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct TopicCounters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Per-topic broker statistics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub published: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

pub struct Broker {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
    counters: Mutex<HashMap<String, Arc<TopicCounters>>>,
    next_id: AtomicU64,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn counters_for(&self, topic: &str) -> Arc<TopicCounters> {
        let mut counters = self.counters.lock().unwrap();
        counters.entry(topic.to_string()).or_default().clone()
    }

    /// Enqueue `event` to every current subscriber of `topic`.
    ///
    /// Never blocks: a subscriber whose queue is full loses this message
    /// (its drop counter is incremented); closed subscribers are pruned.
    pub fn publish(&self, topic: &str, event: BusEvent) {
        let event = Arc::new(event);
        let counters = self.counters_for(topic);
        counters.published.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.topics.lock().unwrap();
        let Some(subs) = topics.get_mut(topic) else {
            return;
        };

        subs.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(topic, subscriber = sub.id, "subscriber queue full, message dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Register a subscriber and get its bounded receive queue.
    ///
    /// Within a single (topic, subscriber) pair delivery preserves
    /// publication order.
    pub fn subscribe_channel(
        &self,
        topic: &str,
        capacity: usize,
    ) -> (SubscriptionToken, mpsc::Receiver<Arc<BusEvent>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Subscriber {
            id,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(sub);
        (SubscriptionToken { id }, rx)
    }

    /// Register a handler driven by a dedicated task. The handler runs on
    /// its own queue, so a slow handler only ever delays itself.
    pub fn subscribe<F>(self: &Arc<Self>, topic: &str, capacity: usize, handler: F) -> SubscriptionToken
    where
        F: Fn(Arc<BusEvent>) + Send + 'static,
    {
        let (token, mut rx) = self.subscribe_channel(topic, capacity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
        });
        token
    }

    /// Remove a subscription; its queued messages are dropped with it.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut topics = self.topics.lock().unwrap();
        for subs in topics.values_mut() {
            subs.retain(|s| s.id != token.id);
        }
    }

    /// Current per-topic counters.
    pub fn stats(&self) -> Vec<TopicStats> {
        let topics = self.topics.lock().unwrap();
        let counters = self.counters.lock().unwrap();
        let mut out: Vec<TopicStats> = counters
            .iter()
            .map(|(topic, c)| TopicStats {
                topic: topic.clone(),
                published: c.published.load(Ordering::Relaxed),
                dropped: c.dropped.load(Ordering::Relaxed),
                subscribers: topics.get(topic).map(Vec::len).unwrap_or(0),
            })
            .collect();
        out.sort_by(|a, b| a.topic.cmp(&b.topic));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shadow_core::{FlowEvent, Protocol};

    fn flow(n: u16) -> BusEvent {
        BusEvent::Flow(FlowEvent {
            timestamp: Utc::now(),
            source_ip: "10.0.0.5".parse().unwrap(),
            destination_ip: "203.0.113.5".parse().unwrap(),
            source_port: n,
            destination_port: 443,
            protocol: Protocol::Tcp,
            bytes_sent: 1,
            bytes_received: 0,
            ja3_hash: None,
            metadata: Default::default(),
        })
    }

    fn flow_port(event: &BusEvent) -> u16 {
        match event {
            BusEvent::Flow(f) => f.source_port,
            _ => panic!("expected flow"),
        }
    }

    #[tokio::test]
    async fn delivers_in_publication_order() {
        let broker = Broker::new();
        let (_token, mut rx) = broker.subscribe_channel(TOPIC_TRAFFIC, 16);

        for n in 0..5 {
            broker.publish(TOPIC_TRAFFIC, flow(n));
        }
        for n in 0..5 {
            let got = rx.recv().await.unwrap();
            assert_eq!(flow_port(&got), n);
        }
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let broker = Broker::new();
        let (_slow, mut slow_rx) = broker.subscribe_channel(TOPIC_TRAFFIC, 2);
        let (_fast, mut fast_rx) = broker.subscribe_channel(TOPIC_TRAFFIC, 16);

        for n in 0..5 {
            broker.publish(TOPIC_TRAFFIC, flow(n));
        }

        // Fast subscriber saw everything.
        for n in 0..5 {
            assert_eq!(flow_port(&fast_rx.recv().await.unwrap()), n);
        }
        // Slow subscriber kept only the first two; the rest were dropped.
        assert_eq!(flow_port(&slow_rx.recv().await.unwrap()), 0);
        assert_eq!(flow_port(&slow_rx.recv().await.unwrap()), 1);
        assert!(slow_rx.try_recv().is_err());

        let stats = broker.stats();
        let traffic = stats.iter().find(|s| s.topic == TOPIC_TRAFFIC).unwrap();
        assert_eq!(traffic.published, 5);
        assert_eq!(traffic.dropped, 3);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let broker = Broker::new();
        let (token, mut rx) = broker.subscribe_channel(TOPIC_ALERTS, 4);
        broker.unsubscribe(token);
        broker.publish(TOPIC_ALERTS, flow(1));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_counted() {
        let broker = Broker::new();
        broker.publish(TOPIC_GRAPH_CHANGES, flow(1));
        let stats = broker.stats();
        let t = stats
            .iter()
            .find(|s| s.topic == TOPIC_GRAPH_CHANGES)
            .unwrap();
        assert_eq!(t.published, 1);
        assert_eq!(t.subscribers, 0);
    }
}
