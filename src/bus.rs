use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// In-process, topic-addressed publish/subscribe channel (spec §4.2).
///
/// Payloads carry no data — a publish is purely a wake-up hint. Delivery is
/// best-effort: a publish with no live subscribers is dropped, and a slow
/// subscriber that falls behind the broadcast channel's buffer sees messages
/// coalesce rather than queue unboundedly. Readers compensate by re-checking
/// authoritative database state after every wake-up (see `crate::wait`).
#[derive(Clone)]
pub struct Bus {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<()>>>>,
}

/// Bounded so a topic that nobody is listening to cannot accumulate memory;
/// lagging subscribers simply miss intermediate wake-ups, which is fine
/// because every wake-up carries identical (empty) meaning.
const TOPIC_CAPACITY: usize = 16;

impl Bus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<()> {
        if let Some(tx) = self.topics.read().expect("bus topics lock poisoned").get(topic) {
            return tx.clone();
        }
        let mut topics = self.topics.write().expect("bus topics lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Posts a wake-up to `topic`. Returns once the bus has accepted the
    /// message; there is no delivery guarantee. A topic with no current
    /// subscribers simply drops the message.
    pub fn publish(&self, topic: &str) {
        let tx = self.sender_for(topic);
        // `send` only errors when there are zero receivers, which is not a
        // failure from the publisher's point of view (spec §4.2: "Delivery
        // is best-effort").
        if tx.send(()).is_err() {
            debug!(topic, "published with no subscribers");
        }
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let tx = self.sender_for(topic);
        Subscription {
            topic: topic.to_string(),
            rx: tx.subscribe(),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<()>,
}

/// Outcome of a bounded-deadline receive.
pub enum RecvOutcome {
    /// A wake-up (or enough lag that one could have been missed) arrived.
    Woken,
    /// The deadline elapsed with nothing received.
    TimedOut,
}

impl Subscription {
    /// Blocks until either a wake-up arrives or `deadline` elapses.
    ///
    /// A `Lagged` receive error is treated as `Woken`: the only safe
    /// assumption when the channel buffer overflowed is that something was
    /// missed, and missing is indistinguishable from "something happened".
    /// A `Closed` channel (no publishers will ever send again) also
    /// resolves as `Woken` so the caller re-checks the database one last
    /// time rather than spinning.
    pub async fn receive(&mut self, deadline: Duration) -> RecvOutcome {
        match tokio::time::timeout(deadline, self.rx.recv()).await {
            Ok(Ok(())) => RecvOutcome::Woken,
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                warn!(topic = %self.topic, lagged = n, "bus subscriber lagged");
                RecvOutcome::Woken
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => RecvOutcome::Woken,
            Err(_elapsed) => RecvOutcome::TimedOut,
        }
    }
}

// `unsubscribe` is implicit: dropping the `Subscription` drops the
// `broadcast::Receiver`, which is all the bus needs to release its
// resources for this subscriber (spec §4.2's `Unsubscribe()`).

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_wakes_subscriber() {
        let bus = Bus::new();
        let mut sub = bus.subscribe("user:abc");
        bus.publish("user:abc");
        match sub.receive(Duration::from_secs(1)).await {
            RecvOutcome::Woken => {}
            RecvOutcome::TimedOut => panic!("expected a wake-up"),
        }
    }

    #[tokio::test]
    async fn receive_times_out_with_no_publish() {
        let bus = Bus::new();
        let mut sub = bus.subscribe("user:abc");
        match sub.receive(Duration::from_millis(50)).await {
            RecvOutcome::TimedOut => {}
            RecvOutcome::Woken => panic!("unexpected wake-up"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = Bus::new();
        bus.publish("descendants:none-listening");
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = Bus::new();
        let mut sub_a = bus.subscribe("user:a");
        let mut sub_b = bus.subscribe("user:b");
        bus.publish("user:a");
        match sub_a.receive(Duration::from_secs(1)).await {
            RecvOutcome::Woken => {}
            RecvOutcome::TimedOut => panic!("expected a wake-up on topic a"),
        }
        match sub_b.receive(Duration::from_millis(50)).await {
            RecvOutcome::TimedOut => {}
            RecvOutcome::Woken => panic!("topic b should not have woken"),
        }
    }
}
