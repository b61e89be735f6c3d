//! In-process typed pub/sub.
//!
//! A [`MsgBroker`] owns named [`Channel`]s; [`Producer`]s publish
//! [`Msg`]s on a channel and every registered [`Consumer`] of that channel
//! receives its own copy, FIFO per channel. Undeliverable publishes go to
//! the `dead_letter` channel, and a wiretap feed copies traffic to the
//! `wiretap` channel for observers.

mod channel;
mod msg;
mod participant;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;

pub use self::{
    channel::Channel,
    msg::{CmdReply, Headers, Msg, MsgBody, MsgIntent},
    participant::{Consumer, ConsumerScope, Producer, ProducerScope},
};
use crate::{error::BrokerError, lock, sync::Scheduler};

/// Name of the always-present wiretap channel.
pub const WIRETAP_CHANNEL: &str = "wiretap";

/// Name of the always-present dead-letter channel.
pub const DEAD_LETTER_CHANNEL: &str = "dead_letter";

/// Name of the always-present null channel (no consumers; the messaging
/// equivalent of /dev/null).
pub const NULL_CHANNEL: &str = "null";

/// A channel argument: either a name or a channel handle.
#[derive(Debug, Clone)]
pub enum ChannelRef {
    /// Referenced by name.
    Name(String),
    /// Referenced by handle.
    Handle(Channel),
}

impl ChannelRef {
    /// The referenced channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Handle(channel) => channel.name(),
        }
    }
}

impl From<&str> for ChannelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ChannelRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&Channel> for ChannelRef {
    fn from(channel: &Channel) -> Self {
        Self::Handle(channel.clone())
    }
}

impl From<Channel> for ChannelRef {
    fn from(channel: Channel) -> Self {
        Self::Handle(channel)
    }
}

struct BrokerInner {
    channels: Mutex<HashMap<String, Channel>>,
    queue_tx: mpsc::UnboundedSender<(Channel, Msg)>,
    wiretap: Channel,
    dead_letter: Channel,
    null: Channel,
}

/// In-process pub/sub broker.
///
/// Owns the set of named channels and a single long-lived dispatcher task,
/// started at construction, that moves published messages into consumer
/// inboxes. Publishing is synchronous (it stamps, enqueues, and returns);
/// dispatch happens on a following scheduler turn, FIFO per channel.
///
/// The channels `wiretap`, `dead_letter`, and `null` always exist.
/// Publishing to an unregistered name dead-letters the message instead of
/// failing; every other publish is also copied to the wiretap channel.
#[derive(Clone)]
pub struct MsgBroker {
    inner: Arc<BrokerInner>,
}

impl MsgBroker {
    /// Create a broker and start its dispatcher on `scheduler`.
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let wiretap = Channel::new(WIRETAP_CHANNEL);
        let dead_letter = Channel::new(DEAD_LETTER_CHANNEL);
        let null = Channel::new(NULL_CHANNEL);

        let mut channels = HashMap::new();
        for channel in [&wiretap, &dead_letter, &null] {
            channels.insert(channel.name().to_string(), channel.clone());
        }

        let _dispatcher = scheduler.start_job(dispatch_loop(queue_rx), "msg-broker-dispatcher");

        Self {
            inner: Arc::new(BrokerInner {
                channels: Mutex::new(channels),
                queue_tx,
                wiretap,
                dead_letter,
                null,
            }),
        }
    }

    /// The wiretap channel.
    #[must_use]
    pub fn wiretap_channel(&self) -> &Channel {
        &self.inner.wiretap
    }

    /// The dead-letter channel.
    #[must_use]
    pub fn dead_letter_channel(&self) -> &Channel {
        &self.inner.dead_letter
    }

    /// The null channel.
    #[must_use]
    pub fn null_channel(&self) -> &Channel {
        &self.inner.null
    }

    /// Register an externally created channel.
    ///
    /// # Errors
    ///
    /// - `BrokerError::ChannelAlreadyRegistered` if the name is taken
    pub fn register_channel(&self, channel: Channel) -> Result<(), BrokerError> {
        let channels = &mut *lock(&self.inner.channels);
        if channels.contains_key(channel.name()) {
            return Err(BrokerError::ChannelAlreadyRegistered(channel.name().to_string()));
        }

        tracing::debug!(channel = channel.name(), "channel registered");
        channels.insert(channel.name().to_string(), channel);
        Ok(())
    }

    /// Deregister a channel. Idempotent.
    pub fn deregister_channel(&self, channel: &Channel) {
        lock(&self.inner.channels).remove(channel.name());
    }

    /// True if `channel` (by name) is registered.
    #[must_use]
    pub fn is_registered(&self, channel: impl Into<ChannelRef>) -> bool {
        let channel = channel.into();
        lock(&self.inner.channels).contains_key(channel.name())
    }

    /// True if a channel with `name` is registered.
    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        lock(&self.inner.channels).contains_key(name)
    }

    /// Get or create the channel named `name`.
    ///
    /// Idempotent: repeated calls return handles to the same channel.
    pub fn add_channel(&self, name: &str) -> Channel {
        let channels = &mut *lock(&self.inner.channels);
        if let Some(channel) = channels.get(name) {
            return channel.clone();
        }

        tracing::debug!(channel = name, "channel registered");
        let channel = Channel::new(name);
        channels.insert(name.to_string(), channel.clone());
        channel
    }

    /// Get the channel named `name`.
    ///
    /// # Errors
    ///
    /// - `BrokerError::UnknownChannel` if no such channel is registered
    pub fn get_channel(&self, name: &str) -> Result<Channel, BrokerError> {
        lock(&self.inner.channels)
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownChannel(name.to_string()))
    }

    /// Create a producer bound to `channel`. Does NOT register it.
    ///
    /// # Errors
    ///
    /// - `BrokerError::UnknownChannel` if the channel is not registered
    pub fn producer(&self, channel: impl Into<ChannelRef>) -> Result<Producer, BrokerError> {
        let channel = self.get_channel(channel.into().name())?;
        Ok(Producer::new(self.clone(), channel))
    }

    /// Create a consumer bound to `channel`. Does NOT register it.
    ///
    /// # Errors
    ///
    /// - `BrokerError::UnknownChannel` if the channel is not registered
    pub fn consumer(&self, channel: impl Into<ChannelRef>) -> Result<Consumer, BrokerError> {
        let channel = self.get_channel(channel.into().name())?;
        Ok(Consumer::new(channel))
    }

    /// Publish `msg` on a channel, returning the stamped message.
    ///
    /// The timestamp is stamped here. If the referenced name is not
    /// registered, the message is wrapped in a dead-letter message (itself
    /// stamped) and routed to the dead-letter channel instead of failing;
    /// the caller still gets back the original message, stamped. Every
    /// publish that is not itself a wiretap, and does not target the
    /// wiretap channel, additionally enqueues a wiretap copy.
    pub fn publish(&self, channel: impl Into<ChannelRef>, mut msg: Msg) -> Msg {
        msg.stamp();

        let channel = channel.into();
        let target = lock(&self.inner.channels).get(channel.name()).cloned();

        let (target, outgoing) = match target {
            Some(target) => (target, msg.clone()),
            None => {
                tracing::warn!(channel = channel.name(), "undeliverable publish, dead-lettering");
                let mut wrapper = Msg::dead_letter(channel.name(), msg.clone());
                wrapper.stamp();
                (self.inner.dead_letter.clone(), wrapper)
            },
        };

        tracing::trace!(
            channel = target.name(),
            msg_id = outgoing.msg_id(),
            intent = ?outgoing.intent(),
            "publish"
        );
        let _ = self.inner.queue_tx.send((target.clone(), outgoing.clone()));

        if outgoing.intent() != MsgIntent::Wiretap && target.name() != WIRETAP_CHANNEL {
            let mut tap = Msg::wiretap(target, outgoing);
            tap.stamp();
            let _ = self.inner.queue_tx.send((self.inner.wiretap.clone(), tap));
        }

        msg
    }
}

/// Move published messages into the inboxes of the target channel's
/// currently registered consumers, FIFO per channel.
async fn dispatch_loop(mut queue_rx: mpsc::UnboundedReceiver<(Channel, Msg)>) {
    while let Some((channel, msg)) = queue_rx.recv().await {
        tracing::trace!(channel = channel.name(), msg_id = msg.msg_id(), "dispatch");
        channel.dispatch(&msg);
    }
}
