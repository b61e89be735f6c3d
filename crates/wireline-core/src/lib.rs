//! Async substrate for P3 implementations.
//!
//! Three cooperating pieces:
//!
//! - [`endpoint`]: a duplex byte-stream endpoint with cooperative
//!   backpressure, a buffered receive side, and transport callbacks in the
//!   shape the I/O runtime drives them.
//! - [`broker`]: an in-process typed pub/sub broker with named channels,
//!   registered producers and consumers, dead-letter routing, and a wiretap
//!   feed.
//! - [`sync`]: the signal primitives holding the rest together: a
//!   latchable value cell ([`sync::AwaitableVar`]), its boolean view
//!   ([`sync::Flag`]), and a task-tracking [`sync::Scheduler`].
//!
//! Everything assumes a single cooperative scheduling domain: shared state
//! is guarded by brief mutex sections that are never held across an await,
//! and ordering guarantees (per-channel FIFO dispatch, per-endpoint FIFO
//! bytes) follow from that.

#![forbid(unsafe_code)]

pub mod broker;
pub mod endpoint;
mod error;
pub mod sync;

pub use broker::{
    Channel, ChannelRef, CmdReply, Consumer, Headers, Msg, MsgBody, MsgBroker, MsgIntent, Producer,
};
pub use endpoint::{Endpoint, EndpointConfig, TcpTransport, Transport};
pub use error::{BrokerError, EndpointError};
pub use sync::{AwaitableVar, Flag, Scheduler};

/// Lock a mutex, recovering the guard if a holder panicked.
///
/// All mutex sections in this crate are short and never await, so a
/// poisoned lock only ever means a panic in test code; the data is still
/// consistent.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
