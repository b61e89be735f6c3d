//! Channel participants: producers and consumers.
//!
//! Both kinds bind to one channel and must be registered before use;
//! registration and deregistration are idempotent. The `scoped()` form
//! registers on entry and deregisters when the guard drops, on any exit
//! path.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    MsgBroker,
    channel::Channel,
    msg::{Headers, Msg},
};
use crate::error::BrokerError;

/// Process-wide participant id counter, shared by producers and consumers.
static PARTICIPANT_ID: AtomicU64 = AtomicU64::new(0);

fn next_participant_id() -> u64 {
    PARTICIPANT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Publishes messages on one channel.
///
/// Created by [`MsgBroker::producer`]; publishing before [`Self::register`]
/// is a runtime error.
pub struct Producer {
    id: u64,
    broker: MsgBroker,
    channel: Channel,
    registered: bool,
}

impl Producer {
    pub(crate) fn new(broker: MsgBroker, channel: Channel) -> Self {
        Self { id: next_participant_id(), broker, channel, registered: false }
    }

    /// The channel this producer is bound to.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// True if currently registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Register with the bound channel. Idempotent.
    pub fn register(&mut self) {
        self.channel.register_producer(self.id);
        self.registered = true;
    }

    /// Deregister from the bound channel. Idempotent.
    pub fn deregister(&mut self) {
        self.channel.deregister_producer(self.id);
        self.registered = false;
    }

    /// Register and return a guard that deregisters on drop.
    pub fn scoped(&mut self) -> ProducerScope<'_> {
        self.register();
        ProducerScope { producer: self }
    }

    /// Publish `msg` on the bound channel, returning it stamped.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the producer is not registered
    pub fn publish(&self, msg: Msg) -> Result<Msg, BrokerError> {
        if !self.registered {
            return Err(BrokerError::NotRegistered {
                role: "producer",
                channel: self.channel.name().to_string(),
            });
        }

        Ok(self.broker.publish(self.channel.clone(), msg))
    }

    /// Build, publish, and return a command message.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the producer is not registered
    pub fn invoke(
        &self,
        sender: impl Into<String>,
        headers: Headers,
        cmd: impl Into<String>,
        cmd_args: Headers,
    ) -> Result<Msg, BrokerError> {
        self.publish(Msg::cmd(sender, headers, cmd, cmd_args))
    }

    /// Build, publish, and return a data message.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the producer is not registered
    pub fn feed(
        &self,
        sender: impl Into<String>,
        headers: Headers,
        data: impl Into<Bytes>,
    ) -> Result<Msg, BrokerError> {
        self.publish(Msg::data(sender, headers, data))
    }

    /// Build, publish, and return an event message.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the producer is not registered
    pub fn notify(
        &self,
        sender: impl Into<String>,
        headers: Headers,
        event: impl Into<String>,
        data: Option<Value>,
    ) -> Result<Msg, BrokerError> {
        self.publish(Msg::event(sender, headers, event, data))
    }
}

/// Scoped registration for a [`Producer`]; deregisters on drop.
pub struct ProducerScope<'a> {
    producer: &'a mut Producer,
}

impl std::ops::Deref for ProducerScope<'_> {
    type Target = Producer;

    fn deref(&self) -> &Producer {
        self.producer
    }
}

impl std::ops::DerefMut for ProducerScope<'_> {
    fn deref_mut(&mut self) -> &mut Producer {
        self.producer
    }
}

impl Drop for ProducerScope<'_> {
    fn drop(&mut self) {
        self.producer.deregister();
    }
}

/// Consumes messages from one channel through an unbounded FIFO inbox.
///
/// Created by [`MsgBroker::consumer`]; fetching before [`Self::register`]
/// is a runtime error. Registering twice delivers each message once.
pub struct Consumer {
    id: u64,
    channel: Channel,
    registered: bool,
    inbox_tx: mpsc::UnboundedSender<Msg>,
    inbox_rx: mpsc::UnboundedReceiver<Msg>,
}

impl Consumer {
    pub(crate) fn new(channel: Channel) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self { id: next_participant_id(), channel, registered: false, inbox_tx, inbox_rx }
    }

    /// The channel this consumer is bound to.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// True if currently registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Register with the bound channel. Idempotent.
    pub fn register(&mut self) {
        self.channel.register_consumer(self.id, self.inbox_tx.clone());
        self.registered = true;
    }

    /// Deregister from the bound channel. Idempotent. Messages already in
    /// the inbox are kept and become fetchable again after re-registering.
    pub fn deregister(&mut self) {
        self.channel.deregister_consumer(self.id);
        self.registered = false;
    }

    /// Register and return a guard that deregisters on drop.
    pub fn scoped(&mut self) -> ConsumerScope<'_> {
        self.register();
        ConsumerScope { consumer: self }
    }

    /// Get the next message, suspending until one arrives.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the consumer is not registered
    pub async fn get(&mut self) -> Result<Msg, BrokerError> {
        if !self.registered {
            return Err(BrokerError::NotRegistered {
                role: "consumer",
                channel: self.channel.name().to_string(),
            });
        }

        // `inbox_tx` lives as long as self, so the channel can never report
        // closed here; the error arm is for completeness.
        self.inbox_rx.recv().await.ok_or(BrokerError::NotRegistered {
            role: "consumer",
            channel: self.channel.name().to_string(),
        })
    }

    /// Get a message if one is already queued, without suspending.
    ///
    /// Gated on registration exactly like [`Self::get`]: a deregistered
    /// consumer cannot drain messages left in its inbox this way either.
    ///
    /// # Errors
    ///
    /// - `BrokerError::NotRegistered` if the consumer is not registered
    pub fn try_get(&mut self) -> Result<Option<Msg>, BrokerError> {
        if !self.registered {
            return Err(BrokerError::NotRegistered {
                role: "consumer",
                channel: self.channel.name().to_string(),
            });
        }

        Ok(self.inbox_rx.try_recv().ok())
    }
}

/// Scoped registration for a [`Consumer`]; deregisters on drop.
pub struct ConsumerScope<'a> {
    consumer: &'a mut Consumer,
}

impl std::ops::Deref for ConsumerScope<'_> {
    type Target = Consumer;

    fn deref(&self) -> &Consumer {
        self.consumer
    }
}

impl std::ops::DerefMut for ConsumerScope<'_> {
    fn deref_mut(&mut self) -> &mut Consumer {
        self.consumer
    }
}

impl Drop for ConsumerScope<'_> {
    fn drop(&mut self) {
        self.consumer.deregister();
    }
}
