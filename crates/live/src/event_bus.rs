//! Topic-keyed pub/sub bus.
//!
//! Each subscriber owns a bounded FIFO queue of capacity
//! [`SUBSCRIBER_CAPACITY`]. Publishing never blocks: a full queue drops its
//! oldest event before the new one is enqueued. The reserved `__global__`
//! topic receives a copy of every event that is also published to a session
//! topic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

pub const SUBSCRIBER_CAPACITY: usize = 100;

/// The topic that mirrors every session-scoped publish.
pub const GLOBAL_TOPIC: &str = "__global__";

/// One event carried on the bus. `hostname` is set by the federation layer
/// when republishing a peer's event; its absence means the event is local.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewMessage {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hostname: Option<String>,
        role: String,
        preview: String,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_uses: Option<Vec<String>>,
    },
    NeedsInput {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hostname: Option<String>,
        timestamp: String,
    },
}

impl Event {
    /// The session this event concerns, used to route it to the session topic.
    pub fn session_id(&self) -> &str {
        match self {
            Event::NewMessage { session_id, .. } => session_id,
            Event::NeedsInput { session_id, .. } => session_id,
        }
    }

    /// Tag the event with an originating hostname if it does not already
    /// carry one, used by the federation layer to re-tag peer events.
    pub fn with_hostname_if_absent(mut self, hostname: &str) -> Self {
        match &mut self {
            Event::NewMessage { hostname: h, .. } | Event::NeedsInput { hostname: h, .. } => {
                if h.is_none() {
                    *h = Some(hostname.to_string());
                }
            }
        }
        self
    }

    pub fn sse_event_name(&self) -> &'static str {
        match self {
            Event::NewMessage { .. } => "new_message",
            Event::NeedsInput { .. } => "needs_input",
        }
    }
}

struct SubscriberQueue {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
}

impl SubscriberQueue {
    fn new() -> Self {
        SubscriberQueue {
            queue: Mutex::new(VecDeque::with_capacity(SUBSCRIBER_CAPACITY)),
            notify: Notify::new(),
        }
    }

    async fn push(&self, event: Event) {
        let mut q = self.queue.lock().await;
        if q.len() >= SUBSCRIBER_CAPACITY {
            q.pop_front();
        }
        q.push_back(event);
        drop(q);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Event {
        loop {
            {
                let mut q = self.queue.lock().await;
                if let Some(event) = q.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }
}

type TopicMap = HashMap<String, HashMap<u64, Arc<SubscriberQueue>>>;

/// The bus itself. Cheap to clone — shares the underlying topic map.
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<Mutex<TopicMap>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            topics: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to `topic`, returning a handle whose `recv` yields events in
    /// publication order (subject to the drop-oldest overflow rule) and
    /// which unsubscribes on drop.
    pub async fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new());
        self.topics
            .lock()
            .await
            .entry(topic.clone())
            .or_default()
            .insert(id, queue.clone());

        Subscription {
            id,
            topic,
            queue,
            bus: self.clone(),
        }
    }

    /// Publish to exactly one topic. Non-blocking: hands off to each
    /// subscriber's bounded queue.
    pub async fn publish(&self, topic: &str, event: Event) {
        let subs: Vec<Arc<SubscriberQueue>> = {
            let topics = self.topics.lock().await;
            match topics.get(topic) {
                Some(m) => m.values().cloned().collect(),
                None => return,
            }
        };
        for sub in subs {
            sub.push(event.clone()).await;
        }
    }

    /// Publish a session-scoped event to both its session topic and
    /// [`GLOBAL_TOPIC`].
    pub async fn publish_session(&self, event: Event) {
        let session_topic = event.session_id().to_string();
        self.publish(&session_topic, event.clone()).await;
        self.publish(GLOBAL_TOPIC, event).await;
    }

    async fn unsubscribe(&self, topic: &str, id: u64) {
        let mut topics = self.topics.lock().await;
        if let Some(subs) = topics.get_mut(topic) {
            subs.remove(&id);
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }

    #[cfg(test)]
    async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

/// A live subscription to one topic. Drop to unsubscribe.
pub struct Subscription {
    id: u64,
    topic: String,
    queue: Arc<SubscriberQueue>,
    bus: EventBus,
}

impl Subscription {
    pub async fn recv(&self) -> Event {
        self.queue.pop().await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let bus = self.bus.clone();
        let topic = self.topic.clone();
        let id = self.id;
        tokio::spawn(async move {
            bus.unsubscribe(&topic, id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(session_id: &str) -> Event {
        Event::NewMessage {
            session_id: session_id.to_string(),
            hostname: None,
            role: "assistant".to_string(),
            preview: "hi".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            tool_uses: None,
        }
    }

    #[tokio::test]
    async fn session_publish_reaches_both_session_and_global_topics() {
        let bus = EventBus::new();
        let session_sub = bus.subscribe("s1").await;
        let global_sub = bus.subscribe(GLOBAL_TOPIC).await;

        bus.publish_session(msg("s1")).await;

        assert_eq!(session_sub.recv().await.session_id(), "s1");
        assert_eq!(global_sub.recv().await.session_id(), "s1");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_keeping_most_recent_capacity() {
        let bus = EventBus::new();
        let sub = bus.subscribe("s1").await;

        for i in 0..(SUBSCRIBER_CAPACITY + 10) {
            bus.publish("s1", msg(&i.to_string())).await;
        }

        let mut seen = Vec::new();
        for _ in 0..SUBSCRIBER_CAPACITY {
            seen.push(sub.recv().await.session_id().to_string());
        }
        assert_eq!(seen.first().unwrap(), "10");
        assert_eq!(seen.last().unwrap(), &(SUBSCRIBER_CAPACITY + 9).to_string());
    }

    #[tokio::test]
    async fn unsubscribe_prunes_empty_topic() {
        let bus = EventBus::new();
        let sub = bus.subscribe("s1").await;
        assert_eq!(bus.subscriber_count("s1").await, 1);
        drop(sub);
        // unsubscribe runs on a spawned task; yield until it lands.
        for _ in 0..50 {
            if bus.subscriber_count("s1").await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.subscriber_count("s1").await, 0);
    }

    #[tokio::test]
    async fn publish_to_topic_with_no_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish("nobody-home", msg("s1")).await;
    }
}
