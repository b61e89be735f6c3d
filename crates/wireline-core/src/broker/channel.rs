//! Named message channels.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::msg::Msg;
use crate::lock;

struct ChannelInner {
    name: String,
    producers: Mutex<Vec<u64>>,
    consumers: Mutex<Vec<(u64, mpsc::UnboundedSender<Msg>)>>,
}

/// The medium messages travel on: a name plus ordered lists of registered
/// producers and consumers.
///
/// Clones are handles to the same channel. Registration in both roles is
/// idempotent by participant id, so a participant registered twice is
/// listed (and delivered to) once.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel. It carries no messages until it is registered with
    /// a broker.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                producers: Mutex::new(Vec::new()),
                consumers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of registered producers.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        lock(&self.inner.producers).len()
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        lock(&self.inner.consumers).len()
    }

    /// True when both handles point at the same channel.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn register_producer(&self, id: u64) {
        let producers = &mut *lock(&self.inner.producers);
        if !producers.contains(&id) {
            producers.push(id);
        }
    }

    pub(crate) fn deregister_producer(&self, id: u64) {
        lock(&self.inner.producers).retain(|p| *p != id);
    }

    pub(crate) fn register_consumer(&self, id: u64, inbox: mpsc::UnboundedSender<Msg>) {
        let consumers = &mut *lock(&self.inner.consumers);
        if !consumers.iter().any(|(cid, _)| *cid == id) {
            consumers.push((id, inbox));
        }
    }

    pub(crate) fn deregister_consumer(&self, id: u64) {
        lock(&self.inner.consumers).retain(|(cid, _)| *cid != id);
    }

    /// Clone `msg` into every currently registered consumer inbox.
    pub(crate) fn dispatch(&self, msg: &Msg) {
        let consumers = &*lock(&self.inner.consumers);
        for (_, inbox) in consumers {
            // A consumer that dropped its inbox mid-dispatch just misses
            // the message, same as one that deregistered a turn earlier.
            let _ = inbox.send(msg.clone());
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("producers", &self.producer_count())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::msg::Headers;

    #[test]
    fn registration_is_idempotent() {
        let channel = Channel::new("events");
        let (tx, _rx) = mpsc::unbounded_channel();

        channel.register_producer(1);
        channel.register_producer(1);
        assert_eq!(channel.producer_count(), 1);

        channel.register_consumer(2, tx.clone());
        channel.register_consumer(2, tx);
        assert_eq!(channel.consumer_count(), 1);
    }

    #[test]
    fn deregistration_is_idempotent() {
        let channel = Channel::new("events");
        channel.register_producer(1);

        channel.deregister_producer(1);
        channel.deregister_producer(1);
        assert_eq!(channel.producer_count(), 0);

        channel.deregister_consumer(9);
        assert_eq!(channel.consumer_count(), 0);
    }

    #[test]
    fn dispatch_reaches_each_consumer_once() {
        let channel = Channel::new("events");
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        channel.register_consumer(1, tx_a.clone());
        channel.register_consumer(1, tx_a); // duplicate, ignored
        channel.register_consumer(2, tx_b);

        let msg = Msg::event("test", Headers::new(), "tick", None);
        channel.dispatch(&msg);

        assert_eq!(rx_a.try_recv().unwrap().msg_id(), msg.msg_id());
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().msg_id(), msg.msg_id());
    }

    #[test]
    fn handle_identity() {
        let channel = Channel::new("events");
        let alias = channel.clone();
        let other = Channel::new("events");

        assert!(channel.same_channel(&alias));
        assert!(!channel.same_channel(&other));
    }
}
