//! Socket-backed transport
//!
//! [`TcpTransport`] is the synchronous handle the event loop owns. Bytes it
//! sends are handed to a writer task which performs the actual socket writes
//! and reports back through the shared event channel:
//!
//! - `Ack` once a chunk has been fully written
//! - `Timeout` when a write stalls longer than the configured limit
//! - `Disconnect` when the writer stops for any reason
//!
//! The send window is enforced by counting bytes handed to the writer and not
//! yet acknowledged, which is what [`Transport::space`] reports. An idle
//! connection takes one write of any size, so a frame larger than the window
//! still goes out whole.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use super::{ConnectionEvent, SessionId, Transport, TransportEvent};

/// Channel every connection reports into
pub type EventSender = mpsc::UnboundedSender<ConnectionEvent<TcpTransport>>;

/// Close request shared between the transport and its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Not closing
    Open,
    /// Flush submitted bytes, then shut down
    Graceful,
    /// Drop everything and shut down now
    Abort,
}

/// Outbound half of a socket connection
#[derive(Debug)]
pub struct TcpTransport {
    id: SessionId,
    window: usize,
    /// Added but not yet handed to the writer
    pending: BytesMut,
    /// Handed to the writer and not yet acknowledged
    in_flight: Arc<AtomicUsize>,
    /// Cleared by the connection tasks once the socket is gone
    open: Arc<AtomicBool>,
    writes: mpsc::UnboundedSender<Bytes>,
    close: watch::Sender<CloseMode>,
}

/// Lifecycle view used by the connection's read side
#[derive(Debug)]
pub struct TransportMonitor {
    close: watch::Receiver<CloseMode>,
    open: Arc<AtomicBool>,
}

impl TransportMonitor {
    /// Resolves once the transport has been closed or dropped
    pub async fn closed(&mut self) {
        let _ = self.close.wait_for(|mode| *mode != CloseMode::Open).await;
    }

    /// Record that the peer went away
    pub fn mark_disconnected(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl TcpTransport {
    /// Spawn the writer task for `socket` and return the transport handle
    pub fn spawn<W>(
        id: SessionId,
        socket: W,
        window: usize,
        ack_timeout: Duration,
        events: EventSender,
    ) -> (Self, TransportMonitor)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(CloseMode::Open);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let open = Arc::new(AtomicBool::new(true));

        let writer = Writer {
            id,
            socket,
            writes: writes_rx,
            close: close_rx.clone(),
            in_flight: Arc::clone(&in_flight),
            open: Arc::clone(&open),
            ack_timeout,
            events,
            opened_at: Instant::now(),
        };
        tokio::spawn(writer.run());

        let transport = Self {
            id,
            window,
            pending: BytesMut::new(),
            in_flight,
            open: Arc::clone(&open),
            writes: writes_tx,
            close: close_tx,
        };
        let monitor = TransportMonitor {
            close: close_rx,
            open,
        };

        (transport, monitor)
    }

    /// Connection id this transport reports under
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Bytes handed to the writer and not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Transport for TcpTransport {
    fn space(&self) -> usize {
        if !self.connected() {
            return 0;
        }
        if self.pending.is_empty() && self.in_flight() == 0 {
            return usize::MAX;
        }
        self.window
            .saturating_sub(self.in_flight() + self.pending.len())
    }

    fn add(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.space());
        self.pending.extend_from_slice(&data[..take]);
        take
    }

    fn can_send(&self) -> bool {
        self.connected()
    }

    fn send(&mut self) -> bool {
        if self.pending.is_empty() || !self.connected() {
            return false;
        }

        let chunk = self.pending.split().freeze();
        self.in_flight.fetch_add(chunk.len(), Ordering::AcqRel);
        self.writes.send(chunk).is_ok()
    }

    fn connected(&self) -> bool {
        self.open.load(Ordering::Acquire) && *self.close.borrow() == CloseMode::Open
    }

    fn close(&mut self, abort: bool) {
        if abort {
            self.pending.clear();
            self.close.send_replace(CloseMode::Abort);
        } else {
            self.send();
            self.close.send_replace(CloseMode::Graceful);
        }
    }
}

struct Writer<W> {
    id: SessionId,
    socket: W,
    writes: mpsc::UnboundedReceiver<Bytes>,
    close: watch::Receiver<CloseMode>,
    in_flight: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
    ack_timeout: Duration,
    events: EventSender,
    opened_at: Instant,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    async fn run(mut self) {
        let shutdown = loop {
            tokio::select! {
                biased;

                changed = self.close.changed() => {
                    let mode = changed.map(|_| *self.close.borrow_and_update());
                    match mode {
                        Ok(CloseMode::Open) => continue,
                        Ok(CloseMode::Graceful) => break self.flush_remaining().await,
                        Ok(CloseMode::Abort) | Err(_) => break false,
                    }
                }

                chunk = self.writes.recv() => {
                    let Some(chunk) = chunk else { break true };
                    if !self.write_chunk(chunk).await {
                        break false;
                    }
                }
            }
        };

        if shutdown {
            let _ = self.socket.shutdown().await;
        }
        self.open.store(false, Ordering::Release);

        tracing::trace!(session_id = self.id, graceful = shutdown, "Writer stopped");
        self.emit(TransportEvent::Disconnect);
    }

    /// Write everything already submitted, used on graceful close
    async fn flush_remaining(&mut self) -> bool {
        while let Ok(chunk) = self.writes.try_recv() {
            if !self.write_chunk(chunk).await {
                return false;
            }
        }
        true
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> bool {
        let started = Instant::now();
        let socket = &mut self.socket;
        let write = async {
            socket.write_all(&chunk).await?;
            socket.flush().await
        };

        let result = tokio::time::timeout(self.ack_timeout, write).await;

        match result {
            Ok(Ok(())) => {
                self.in_flight.fetch_sub(chunk.len(), Ordering::AcqRel);
                self.emit(TransportEvent::Ack {
                    len: chunk.len(),
                    time: self.opened_at.elapsed(),
                });
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(session_id = self.id, error = %e, "Write failed");
                false
            }
            Err(_) => {
                let elapsed = started.elapsed();
                tracing::warn!(
                    session_id = self.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Write stalled"
                );
                self.emit(TransportEvent::Timeout { elapsed });

                // A cancelled write leaves the stream position unknown, so nothing
                // more is written; wait for the owner to close.
                let _ = self
                    .close
                    .wait_for(|mode| *mode != CloseMode::Open)
                    .await;
                false
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self
            .events
            .send(ConnectionEvent::Transport { id: self.id, event });
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<ConnectionEvent<TcpTransport>>,
    ) -> TransportEvent {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event in time")
            .expect("channel closed");
        match event {
            ConnectionEvent::Transport { event, .. } => event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_is_acknowledged() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut transport, _monitor) =
            TcpTransport::spawn(7, client, 16, Duration::from_secs(5), tx);

        assert_eq!(transport.write(b"data: a\r\n\r\n"), 11);
        assert_eq!(transport.space(), 5);

        match next_event(&mut rx).await {
            TransportEvent::Ack { len, .. } => assert_eq!(len, 11),
            other => panic!("expected ack, got {:?}", other),
        }
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.space(), usize::MAX);

        let mut buf = [0u8; 11];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"data: a\r\n\r\n");
    }

    #[tokio::test]
    async fn test_add_respects_window() {
        let (client, _server) = tokio::io::duplex(1024);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut transport, _monitor) =
            TcpTransport::spawn(1, client, 4, Duration::from_secs(5), tx);

        assert_eq!(transport.add(b"ab"), 2);
        assert_eq!(transport.space(), 2);
        assert_eq!(transport.add(b"cdef"), 2);
        assert_eq!(transport.space(), 0);
        assert_eq!(transport.add(b"g"), 0);
    }

    #[tokio::test]
    async fn test_idle_takes_oversized_write() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut transport, _monitor) =
            TcpTransport::spawn(5, client, 16, Duration::from_secs(5), tx);

        assert_eq!(transport.write(&[b'z'; 64]), 64);
        assert_eq!(transport.space(), 0);
        assert_eq!(transport.add(b"more"), 0);

        match next_event(&mut rx).await {
            TransportEvent::Ack { len, .. } => assert_eq!(len, 64),
            other => panic!("expected ack, got {:?}", other),
        }

        let mut buf = [0u8; 64];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [b'z'; 64]);
    }

    #[tokio::test]
    async fn test_graceful_close_flushes() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut transport, mut monitor) =
            TcpTransport::spawn(2, client, 64, Duration::from_secs(5), tx);

        transport.add(b"bye");
        transport.close(false);
        assert!(!transport.connected());
        monitor.closed().await;

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        assert!(matches!(next_event(&mut rx).await, TransportEvent::Ack { len: 3, .. }));
        assert_eq!(next_event(&mut rx).await, TransportEvent::Disconnect);
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        // Tiny pipe that nobody reads from
        let (client, _server) = tokio::io::duplex(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut transport, _monitor) =
            TcpTransport::spawn(3, client, 1024, Duration::from_millis(50), tx);

        transport.write(&[b'x'; 64]);

        match next_event(&mut rx).await {
            TransportEvent::Timeout { elapsed } => {
                assert!(elapsed >= Duration::from_millis(50))
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        transport.close(true);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Disconnect);
    }

    #[tokio::test]
    async fn test_peer_disconnect_clears_space() {
        let (client, _server) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (transport, monitor) =
            TcpTransport::spawn(4, client, 64, Duration::from_secs(5), tx);

        monitor.mark_disconnected();
        assert!(!transport.connected());
        assert_eq!(transport.space(), 0);
    }
}
