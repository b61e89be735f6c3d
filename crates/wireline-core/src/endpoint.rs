//! Byte-stream endpoint with cooperative backpressure.
//!
//! An [`Endpoint`] is the protocol-side surface of a duplex byte pipe. The
//! I/O runtime drives it through transport callbacks (`connection_made`,
//! `data_received`, `pause_writing`, ...) while protocol code uses the
//! socket-like async operations (`send`, `recv`, `recv_exactly`, `flush`).
//!
//! Backpressure is cooperative: when the transport's outbound queue crosses
//! its high-water mark it pauses the endpoint, and `send`/`flush` suspend
//! until writing resumes. Receive ordering is strictly FIFO over the byte
//! stream; writers do not serialize among themselves, so callers needing
//! message boundaries must frame above the endpoint (that is what the P3
//! sync/msg_end bytes are for).

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Notify, mpsc},
};

use crate::{
    error::EndpointError,
    lock,
    sync::{Flag, Scheduler},
};

/// Default outbound high-water mark (bytes queued before writing pauses).
pub const DEFAULT_HIGH_WATER: usize = 64 * 1024;

/// Default outbound low-water mark (queued bytes at which writing resumes).
pub const DEFAULT_LOW_WATER: usize = 16 * 1024;

/// Default size of the transport's read chunks.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Endpoint/transport configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Queued outbound bytes above which the transport pauses writing.
    pub high_water: usize,
    /// Queued outbound bytes at or below which writing resumes.
    pub low_water: usize,
    /// Read chunk size for the transport's receive loop.
    pub read_chunk: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            high_water: DEFAULT_HIGH_WATER,
            low_water: DEFAULT_LOW_WATER,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Outbound side of an attached transport.
///
/// Implementations enqueue writes somewhere the runtime drains, and invoke
/// the endpoint's pause/resume callbacks as their queue crosses the water
/// marks.
pub trait Transport: Send + Sync {
    /// Enqueue `data` for transmission. Never blocks.
    fn write(&self, data: Bytes);

    /// Begin closing the transport. Queued data may still drain.
    fn close(&self);

    /// Address of the remote peer, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

struct EndpointState {
    writing_paused: bool,
    buffer: BytesMut,
    buffer_waiter: Option<Arc<Notify>>,
    flush_waiters: Vec<(u64, Arc<Notify>)>,
    next_waiter: u64,
    transport: Option<Arc<dyn Transport>>,
}

struct EndpointInner {
    connected: Flag,
    scheduler: Scheduler,
    state: Mutex<EndpointState>,
}

/// A duplex byte-stream endpoint.
///
/// Clones share the same endpoint. `writing_paused` starts true and stays
/// true until a transport attaches; `connected` is a [`Flag`], so tasks can
/// latch on connection and disconnection.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    /// Create a detached endpoint whose transport tasks will run on
    /// `scheduler`.
    #[must_use]
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                connected: Flag::new(false),
                scheduler,
                state: Mutex::new(EndpointState {
                    writing_paused: true,
                    buffer: BytesMut::new(),
                    buffer_waiter: None,
                    flush_waiters: Vec::new(),
                    next_waiter: 0,
                    transport: None,
                }),
            }),
        }
    }

    /// The connection latch. Set while a transport is attached.
    #[must_use]
    pub fn connected(&self) -> Flag {
        self.inner.connected.clone()
    }

    /// True while the transport's outbound queue is above its high-water
    /// mark (or no transport is attached).
    #[must_use]
    pub fn is_writing_paused(&self) -> bool {
        lock(&self.inner.state).writing_paused
    }

    /// Bytes currently held in the receive buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        lock(&self.inner.state).buffer.len()
    }

    /// Address of the connected peer, or `None` when disconnected.
    #[must_use]
    pub fn getpeername(&self) -> Option<SocketAddr> {
        if self.inner.connected.is_clear() {
            return None;
        }

        lock(&self.inner.state).transport.as_ref().and_then(|t| t.peer_addr())
    }

    // Transport callbacks. The I/O runtime invokes these synchronously with
    // respect to the scheduler.

    /// Attach a transport: sets `connected`, clears `writing_paused`.
    pub fn connection_made(&self, transport: Arc<dyn Transport>) {
        let peer = transport.peer_addr();
        {
            let state = &mut *lock(&self.inner.state);
            state.transport = Some(transport);
            state.writing_paused = false;
        }
        self.inner.connected.set();
        tracing::debug!(?peer, "connection made");
    }

    /// Detach the transport: clears `connected`, pauses writing.
    ///
    /// In-flight operations are not failed; they complete when the
    /// scheduler wakes them and observe the closed state then.
    pub fn connection_lost(&self, error: Option<std::io::Error>) {
        {
            let state = &mut *lock(&self.inner.state);
            state.writing_paused = true;
            state.transport = None;
        }
        self.inner.connected.clear();

        match error {
            Some(error) => tracing::debug!(%error, "connection lost"),
            None => tracing::debug!("connection lost (eof)"),
        }
    }

    /// Append received bytes to the buffer and wake the buffer waiter, if
    /// one is suspended.
    pub fn data_received(&self, data: &[u8]) {
        let waiter = {
            let state = &mut *lock(&self.inner.state);
            state.buffer.extend_from_slice(data);
            state.buffer_waiter.take()
        };

        // A cancelled waiter has already cleared the slot, so whoever we
        // took here is live (or freshly cancelled, in which case the permit
        // goes nowhere).
        if let Some(waiter) = waiter {
            waiter.notify_one();
        }
    }

    /// Pause writing (outbound queue above the high-water mark).
    pub fn pause_writing(&self) {
        lock(&self.inner.state).writing_paused = true;
    }

    /// Resume writing and wake all pending flush waiters.
    pub fn resume_writing(&self) {
        let state = &mut *lock(&self.inner.state);
        state.writing_paused = false;

        for (_, waiter) in &state.flush_waiters {
            waiter.notify_one();
        }
    }

    // Socket-like operations.

    /// Open a TCP connection and attach this endpoint as its protocol.
    ///
    /// # Errors
    ///
    /// - `EndpointError::Io` if the connection cannot be established
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        config: EndpointConfig,
    ) -> Result<(), EndpointError> {
        let stream = TcpStream::connect((host, port)).await?;
        let transport = TcpTransport::start(stream, self.clone(), config)?;
        self.connection_made(transport);
        Ok(())
    }

    /// Close the endpoint: pause writing, clear `connected`, close the
    /// transport, and yield once so it can finalize.
    pub async fn close(&self) {
        let transport = {
            let state = &mut *lock(&self.inner.state);
            state.writing_paused = true;
            state.transport.take()
        };
        self.inner.connected.clear();

        if let Some(transport) = transport {
            transport.close();
        }

        tokio::task::yield_now().await;
    }

    /// Enqueue `data` on the transport, then [`Self::flush`].
    ///
    /// Concurrent senders may interleave their bytes; message boundaries
    /// belong to the layer above.
    ///
    /// # Errors
    ///
    /// - `EndpointError::NotConnected` if no transport is attached
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), EndpointError> {
        let transport =
            lock(&self.inner.state).transport.clone().ok_or(EndpointError::NotConnected)?;

        transport.write(data.into());
        self.flush().await;
        Ok(())
    }

    /// Wait for the outbound queue to come back under the low-water mark.
    ///
    /// Returns immediately unless writing is paused; otherwise suspends
    /// until `resume_writing` is observed.
    pub async fn flush(&self) {
        let guard = {
            let state = &mut *lock(&self.inner.state);
            if !state.writing_paused {
                return;
            }

            let id = state.next_waiter;
            state.next_waiter += 1;

            let notify = Arc::new(Notify::new());
            state.flush_waiters.push((id, notify.clone()));
            FlushGuard { inner: &*self.inner, id, notify }
        };

        guard.notify.notified().await;
    }

    /// Receive at most `size` bytes, consuming them from the buffer.
    ///
    /// `size == 0` returns empty immediately. An empty buffer waits for the
    /// next arrival, then returns whatever is available up to `size`.
    ///
    /// # Errors
    ///
    /// - `EndpointError::BufferWaiterBusy` if another task is already
    ///   waiting on the buffer
    pub async fn recv(&self, size: usize) -> Result<Bytes, EndpointError> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        {
            let state = &mut *lock(&self.inner.state);
            if !state.buffer.is_empty() {
                let take = usize::min(size, state.buffer.len());
                return Ok(state.buffer.split_to(take).freeze());
            }
        }

        self.wait_for_buffer("recv").await?;

        let state = &mut *lock(&self.inner.state);
        let take = usize::min(size, state.buffer.len());
        Ok(state.buffer.split_to(take).freeze())
    }

    /// Receive exactly `size` bytes, waiting until the buffer holds at
    /// least that many.
    ///
    /// `size == 0` returns empty immediately.
    ///
    /// # Errors
    ///
    /// - `EndpointError::BufferWaiterBusy` if another task is already
    ///   waiting on the buffer
    pub async fn recv_exactly(&self, size: usize) -> Result<Bytes, EndpointError> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        loop {
            {
                let state = &mut *lock(&self.inner.state);
                if state.buffer.len() >= size {
                    return Ok(state.buffer.split_to(size).freeze());
                }
            }

            self.wait_for_buffer("recv_exactly").await?;
        }
    }

    /// Wait until the buffer receives any data.
    ///
    /// At most one task may wait on the buffer at a time.
    ///
    /// # Errors
    ///
    /// - `EndpointError::BufferWaiterBusy` if another task is already
    ///   waiting on the buffer
    pub async fn wait_for_buffer(&self, caller: &'static str) -> Result<(), EndpointError> {
        let guard = {
            let state = &mut *lock(&self.inner.state);
            if state.buffer_waiter.is_some() {
                return Err(EndpointError::BufferWaiterBusy { caller });
            }

            let notify = Arc::new(Notify::new());
            state.buffer_waiter = Some(notify.clone());
            BufferWaiterGuard { inner: &*self.inner, notify }
        };

        guard.notify.notified().await;
        Ok(())
    }
}

/// Removes a flush registration on completion or cancellation.
struct FlushGuard<'a> {
    inner: &'a EndpointInner,
    id: u64,
    notify: Arc<Notify>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        lock(&self.inner.state).flush_waiters.retain(|(id, _)| *id != self.id);
    }
}

/// Clears the buffer-waiter slot on completion or cancellation.
///
/// A fulfilled waiter was already taken out of the slot by
/// [`Endpoint::data_received`]; the pointer comparison makes sure a
/// cancelled waiter never clears a successor's registration.
struct BufferWaiterGuard<'a> {
    inner: &'a EndpointInner,
    notify: Arc<Notify>,
}

impl Drop for BufferWaiterGuard<'_> {
    fn drop(&mut self) {
        let state = &mut *lock(&self.inner.state);
        if state.buffer_waiter.as_ref().is_some_and(|w| Arc::ptr_eq(w, &self.notify)) {
            state.buffer_waiter = None;
        }
    }
}

enum WriteOp {
    Data(Bytes),
    Shutdown,
}

/// TCP transport: an owned socket drained by reader and writer tasks.
///
/// Outbound writes go through an unbounded queue whose byte count is
/// tracked against the configured water marks; crossing the high mark
/// pauses the endpoint and draining to the low mark resumes it.
pub struct TcpTransport {
    tx: mpsc::UnboundedSender<WriteOp>,
    queued: Arc<AtomicUsize>,
    peer: SocketAddr,
    high_water: usize,
    endpoint: Endpoint,
}

impl TcpTransport {
    /// Split `stream` and start the reader/writer tasks on the endpoint's
    /// scheduler. Does not invoke `connection_made`; the caller does that
    /// once it holds the transport handle.
    ///
    /// # Errors
    ///
    /// - `EndpointError::Io` if the peer address cannot be read
    pub fn start(
        stream: TcpStream,
        endpoint: Endpoint,
        config: EndpointConfig,
    ) -> Result<Arc<Self>, EndpointError> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));

        let scheduler = endpoint.inner.scheduler.clone();
        let _read = scheduler.start_job(
            read_loop(reader, endpoint.clone(), config.read_chunk),
            format!("tcp-read {peer}"),
        );
        let _write = scheduler.start_job(
            write_loop(writer, rx, queued.clone(), endpoint.clone(), config.low_water),
            format!("tcp-write {peer}"),
        );

        Ok(Arc::new(Self { tx, queued, peer, high_water: config.high_water, endpoint }))
    }
}

impl Transport for TcpTransport {
    fn write(&self, data: Bytes) {
        let total = self.queued.fetch_add(data.len(), Ordering::SeqCst) + data.len();
        if total > self.high_water {
            self.endpoint.pause_writing();
        }

        // The writer task has exited only if the connection is already
        // lost; dropping the bytes then matches what the socket would do.
        let _ = self.tx.send(WriteOp::Data(data));
    }

    fn close(&self) {
        let _ = self.tx.send(WriteOp::Shutdown);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

async fn read_loop(mut reader: OwnedReadHalf, endpoint: Endpoint, chunk: usize) {
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                endpoint.connection_lost(None);
                break;
            },
            Ok(n) => endpoint.data_received(&buf[..n]),
            Err(error) => {
                endpoint.connection_lost(Some(error));
                break;
            },
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    queued: Arc<AtomicUsize>,
    endpoint: Endpoint,
    low_water: usize,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Data(data) => {
                let result = writer.write_all(&data).await;
                let remaining = queued.fetch_sub(data.len(), Ordering::SeqCst) - data.len();

                if let Err(error) = result {
                    endpoint.connection_lost(Some(error));
                    return;
                }

                if remaining <= low_water
                    && endpoint.inner.connected.is_set()
                    && endpoint.is_writing_paused()
                {
                    endpoint.resume_writing();
                }
            },
            WriteOp::Shutdown => break,
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport double that records writes and close calls.
    struct MockTransport {
        writes: Mutex<Vec<Bytes>>,
        closed: Mutex<bool>,
        peer: SocketAddr,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
                peer: "10.0.0.1:5190".parse().unwrap(),
            })
        }
    }

    impl Transport for MockTransport {
        fn write(&self, data: Bytes) {
            lock(&self.writes).push(data);
        }

        fn close(&self) {
            *lock(&self.closed) = true;
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            Some(self.peer)
        }
    }

    fn attached_endpoint() -> (Endpoint, Arc<MockTransport>) {
        let endpoint = Endpoint::new(Scheduler::new());
        let transport = MockTransport::new();
        endpoint.connection_made(transport.clone());
        (endpoint, transport)
    }

    #[tokio::test]
    async fn starts_detached_and_paused() {
        let endpoint = Endpoint::new(Scheduler::new());
        assert!(endpoint.is_writing_paused());
        assert!(endpoint.connected().is_clear());
        assert_eq!(endpoint.getpeername(), None);
    }

    #[tokio::test]
    async fn connection_made_attaches() {
        let (endpoint, transport) = attached_endpoint();
        assert!(endpoint.connected().is_set());
        assert!(!endpoint.is_writing_paused());
        assert_eq!(endpoint.getpeername(), Some(transport.peer));
    }

    #[tokio::test]
    async fn connection_lost_detaches() {
        let (endpoint, _transport) = attached_endpoint();
        endpoint.connection_lost(None);
        assert!(endpoint.connected().is_clear());
        assert!(endpoint.is_writing_paused());
        assert_eq!(endpoint.getpeername(), None);
    }

    #[tokio::test]
    async fn send_writes_through_transport() {
        let (endpoint, transport) = attached_endpoint();
        endpoint.send(b"\xDE\xAD\xC0\xDE".as_slice()).await.unwrap();
        assert_eq!(lock(&transport.writes).as_slice(), &[Bytes::from_static(b"\xDE\xAD\xC0\xDE")]);
    }

    #[tokio::test]
    async fn send_without_transport_fails() {
        let endpoint = Endpoint::new(Scheduler::new());
        let result = endpoint.send(b"data".as_slice()).await;
        assert!(matches!(result, Err(EndpointError::NotConnected)));
    }

    #[tokio::test]
    async fn send_suspends_under_backpressure() {
        let (endpoint, transport) = attached_endpoint();
        endpoint.pause_writing();

        let sender = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.send(b"\xDE\xAD\xC0\xDE".as_slice()).await })
        };

        // The bytes are enqueued but the task stays suspended in flush().
        tokio::task::yield_now().await;
        assert_eq!(lock(&transport.writes).len(), 1);
        assert!(!sender.is_finished());

        endpoint.resume_writing();
        sender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn resume_wakes_all_flush_waiters() {
        let (endpoint, _transport) = attached_endpoint();
        endpoint.pause_writing();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let endpoint = endpoint.clone();
                tokio::spawn(async move { endpoint.flush().await })
            })
            .collect();

        tokio::task::yield_now().await;
        endpoint.resume_writing();

        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert!(lock(&endpoint.inner.state).flush_waiters.is_empty());
    }

    #[tokio::test]
    async fn flush_returns_immediately_when_not_paused() {
        let (endpoint, _transport) = attached_endpoint();
        endpoint.flush().await;
    }

    #[tokio::test]
    async fn recv_returns_buffered_bytes() {
        let (endpoint, _transport) = attached_endpoint();
        endpoint.data_received(b"hello world");

        assert_eq!(endpoint.recv(5).await.unwrap().as_ref(), b"hello");
        assert_eq!(endpoint.recv(100).await.unwrap().as_ref(), b" world");
    }

    #[tokio::test]
    async fn recv_zero_returns_empty() {
        let (endpoint, _transport) = attached_endpoint();
        assert!(endpoint.recv(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recv_waits_for_arrival() {
        let (endpoint, _transport) = attached_endpoint();

        let receiver = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.recv(16).await })
        };

        tokio::task::yield_now().await;
        assert!(!receiver.is_finished());

        endpoint.data_received(b"late");
        assert_eq!(receiver.await.unwrap().unwrap().as_ref(), b"late");
    }

    #[tokio::test]
    async fn recv_exactly_accumulates() {
        let (endpoint, _transport) = attached_endpoint();

        let receiver = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.recv_exactly(6).await })
        };

        tokio::task::yield_now().await;
        endpoint.data_received(b"ab");
        tokio::task::yield_now().await;
        assert!(!receiver.is_finished());

        endpoint.data_received(b"cdef99");
        assert_eq!(receiver.await.unwrap().unwrap().as_ref(), b"abcdef");
        assert_eq!(endpoint.buffer_len(), 2);
    }

    #[tokio::test]
    async fn second_buffer_waiter_is_rejected() {
        let (endpoint, _transport) = attached_endpoint();

        let first = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.recv(1).await })
        };
        tokio::task::yield_now().await;

        let second = endpoint.wait_for_buffer("recv").await;
        assert!(matches!(second, Err(EndpointError::BufferWaiterBusy { caller: "recv" })));

        endpoint.data_received(b"x");
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_buffer_waiter_unregisters() {
        let (endpoint, _transport) = attached_endpoint();

        let waiter = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.recv(1).await })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        // The slot is free again for the next caller.
        assert!(lock(&endpoint.inner.state).buffer_waiter.is_none());
        endpoint.data_received(b"y");
        assert_eq!(endpoint.recv(1).await.unwrap().as_ref(), b"y");
    }

    #[tokio::test]
    async fn close_pauses_and_closes_transport() {
        let (endpoint, transport) = attached_endpoint();
        endpoint.close().await;

        assert!(endpoint.is_writing_paused());
        assert!(endpoint.connected().is_clear());
        assert!(*lock(&transport.closed));
    }
}
