//! Error types for the endpoint and broker layers.
//!
//! These cover invalid-state conditions (programming errors surfaced to the
//! caller) and I/O failures at the connect boundary. Undeliverable publishes
//! are NOT errors; the broker routes them to the dead-letter channel.

use std::io;

use thiserror::Error;

/// Errors from [`crate::Endpoint`] operations.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Operation requires an attached transport.
    #[error("endpoint is not connected")]
    NotConnected,

    /// A second caller tried to wait on the receive buffer while another
    /// waiter was already suspended. At most one buffer waiter may exist.
    #[error("{caller}() called while another task is awaiting the buffer")]
    BufferWaiterBusy {
        /// Name of the operation that attempted the second wait
        caller: &'static str,
    },

    /// Underlying socket error while connecting.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from [`crate::MsgBroker`] and its participants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// `register_channel` was called with a name that is already taken.
    #[error("channel {0:?} already registered")]
    ChannelAlreadyRegistered(String),

    /// The named channel is not registered with the broker.
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),

    /// A producer published, or a consumer fetched, without registering
    /// first.
    #[error("{role} is not registered with channel {channel:?}")]
    NotRegistered {
        /// Which participant kind misbehaved ("producer" or "consumer")
        role: &'static str,
        /// The channel the participant is bound to
        channel: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(EndpointError::NotConnected.to_string(), "endpoint is not connected");
        assert_eq!(
            EndpointError::BufferWaiterBusy { caller: "recv" }.to_string(),
            "recv() called while another task is awaiting the buffer"
        );
        assert_eq!(
            BrokerError::UnknownChannel("events".to_string()).to_string(),
            "unknown channel \"events\""
        );
        assert_eq!(
            BrokerError::NotRegistered { role: "producer", channel: "events".to_string() }
                .to_string(),
            "producer is not registered with channel \"events\""
        );
    }
}
