//! Broker messages.
//!
//! One shared header record plus a tagged body, instead of a class
//! hierarchy: every message carries an id, an intent, a sender, headers,
//! and a timestamp; the body says whether it is a command, data, an event,
//! or one of the broker-generated wrappers (dead letter, wiretap).

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::channel::Channel;

/// Process-wide message id counter. Ids are unique and strictly increasing
/// in construction order, across all brokers in the process.
static MSG_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_msg_id() -> u64 {
    MSG_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Message header map: string keys, arbitrary JSON values.
pub type Headers = HashMap<String, Value>;

/// What a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgIntent {
    /// Invoke a command.
    Cmd,
    /// Carry data.
    Data,
    /// Announce an event.
    Event,
    /// Not a valid intent (placeholder for unclassifiable messages).
    Invalid,
    /// Wrapper around an undeliverable message.
    Deadletter,
    /// Wrapper around a tapped message.
    Wiretap,
}

/// Replies to command messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdReply {
    /// Command executed.
    Done,
    /// Command not recognized by the receiver.
    UnknownCmd,
}

/// Body of a [`Msg`], tagged by kind.
#[derive(Debug, Clone)]
pub enum MsgBody {
    /// Invoke `cmd` with `cmd_args`.
    Cmd {
        /// The command or functionality to invoke.
        cmd: String,
        /// Argument name/value pairs for the command.
        cmd_args: Headers,
    },
    /// Opaque data.
    Data {
        /// The data bytes.
        data: Bytes,
    },
    /// Something happened.
    Event {
        /// The event that occurred.
        event: String,
        /// Optional event data.
        data: Option<Value>,
    },
    /// A message published to an unregistered channel.
    DeadLetter {
        /// Name the message was originally published under.
        channel_name: String,
        /// The original message.
        msg: Box<Msg>,
    },
    /// A copy of a message observed by the wiretap feed.
    Wiretap {
        /// The channel the message was actually published on.
        channel: Channel,
        /// The original message.
        msg: Box<Msg>,
    },
}

/// A message sent to an internal service or component.
///
/// The timestamp is stamped by the broker at publish time, not at
/// construction; a message that was never published has `timestamp() ==
/// None`.
#[derive(Debug, Clone)]
pub struct Msg {
    msg_id: u64,
    intent: MsgIntent,
    sender: String,
    headers: Headers,
    timestamp: Option<DateTime<Utc>>,
    body: MsgBody,
}

impl Msg {
    fn new(intent: MsgIntent, sender: impl Into<String>, headers: Headers, body: MsgBody) -> Self {
        Self {
            msg_id: next_msg_id(),
            intent,
            sender: sender.into(),
            headers,
            timestamp: None,
            body,
        }
    }

    /// Build a command message.
    #[must_use]
    pub fn cmd(
        sender: impl Into<String>,
        headers: Headers,
        cmd: impl Into<String>,
        cmd_args: Headers,
    ) -> Self {
        Self::new(MsgIntent::Cmd, sender, headers, MsgBody::Cmd { cmd: cmd.into(), cmd_args })
    }

    /// Build a data message.
    #[must_use]
    pub fn data(sender: impl Into<String>, headers: Headers, data: impl Into<Bytes>) -> Self {
        Self::new(MsgIntent::Data, sender, headers, MsgBody::Data { data: data.into() })
    }

    /// Build an event message.
    #[must_use]
    pub fn event(
        sender: impl Into<String>,
        headers: Headers,
        event: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::new(MsgIntent::Event, sender, headers, MsgBody::Event { event: event.into(), data })
    }

    /// Wrap an undeliverable message. Sender is the literal `"deadletter"`.
    #[must_use]
    pub fn dead_letter(channel_name: impl Into<String>, msg: Msg) -> Self {
        Self::new(
            MsgIntent::Deadletter,
            "deadletter",
            Headers::new(),
            MsgBody::DeadLetter { channel_name: channel_name.into(), msg: Box::new(msg) },
        )
    }

    /// Wrap a tapped message. Sender is the literal `"wiretap"`.
    #[must_use]
    pub fn wiretap(channel: Channel, msg: Msg) -> Self {
        Self::new(
            MsgIntent::Wiretap,
            "wiretap",
            Headers::new(),
            MsgBody::Wiretap { channel, msg: Box::new(msg) },
        )
    }

    /// Unique message id.
    #[must_use]
    pub fn msg_id(&self) -> u64 {
        self.msg_id
    }

    /// Message intent.
    #[must_use]
    pub fn intent(&self) -> MsgIntent {
        self.intent
    }

    /// Message sender.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Message headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Add a header field.
    pub fn add_header(&mut self, name: impl Into<String>, value: Value) {
        self.headers.insert(name.into(), value);
    }

    /// Publish timestamp (UTC). `None` until the broker publishes the
    /// message.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> &MsgBody {
        &self.body
    }

    /// Stamp the publish timestamp with the current UTC instant.
    pub(crate) fn stamp(&mut self) {
        self.timestamp = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let first = Msg::data("test", Headers::new(), Bytes::new());
        let second = Msg::event("test", Headers::new(), "tick", None);
        let third = Msg::cmd("test", Headers::new(), "stop", Headers::new());

        assert!(first.msg_id() < second.msg_id());
        assert!(second.msg_id() < third.msg_id());
    }

    #[test]
    fn cmd_msg_fields() {
        let mut args = Headers::new();
        args.insert("speed".to_string(), json!(9600));
        let msg = Msg::cmd("session", Headers::new(), "dial", args);

        assert_eq!(msg.intent(), MsgIntent::Cmd);
        assert_eq!(msg.sender(), "session");
        assert!(msg.timestamp().is_none());
        match msg.body() {
            MsgBody::Cmd { cmd, cmd_args } => {
                assert_eq!(cmd, "dial");
                assert_eq!(cmd_args.get("speed"), Some(&json!(9600)));
            },
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn headers_merge() {
        let mut headers = Headers::new();
        headers.insert("trace".to_string(), json!("abc"));
        let mut msg = Msg::data("test", headers, Bytes::from_static(b"x"));
        msg.add_header("hop", json!(1));

        assert_eq!(msg.headers().len(), 2);
        assert_eq!(msg.headers().get("trace"), Some(&json!("abc")));
        assert_eq!(msg.headers().get("hop"), Some(&json!(1)));
    }

    #[test]
    fn dead_letter_wraps_original() {
        let original = Msg::data("test", Headers::new(), Bytes::from_static(b"lost"));
        let original_id = original.msg_id();
        let wrapper = Msg::dead_letter("nowhere", original);

        assert_eq!(wrapper.intent(), MsgIntent::Deadletter);
        assert_eq!(wrapper.sender(), "deadletter");
        match wrapper.body() {
            MsgBody::DeadLetter { channel_name, msg } => {
                assert_eq!(channel_name, "nowhere");
                assert_eq!(msg.msg_id(), original_id);
            },
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn wiretap_wraps_original() {
        let channel = Channel::new("events");
        let original = Msg::event("test", Headers::new(), "tick", None);
        let wrapper = Msg::wiretap(channel.clone(), original);

        assert_eq!(wrapper.intent(), MsgIntent::Wiretap);
        assert_eq!(wrapper.sender(), "wiretap");
        match wrapper.body() {
            MsgBody::Wiretap { channel: tapped, .. } => assert_eq!(tapped.name(), "events"),
            other => panic!("wrong body: {other:?}"),
        }
    }
}
