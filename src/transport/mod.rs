//! Byte-stream transport boundary
//!
//! The streaming core never touches sockets directly. It talks to a
//! [`Transport`] that reports how much it can currently accept, and it is
//! driven by [`TransportEvent`]s the owner of the transport delivers later:
//!
//! ```text
//!   ClientSession ──add()/send()──► Transport ──bytes──► peer
//!        ▲                              │
//!        └──── TransportEvent ◄─────────┘
//!              (Ack, Poll, Timeout, Disconnect)
//! ```
//!
//! Events are addressed by [`SessionId`] and routed through the owning
//! [`EventSource`](crate::source::EventSource), so no transport ever holds a
//! reference back to its session.

pub mod memory;
pub mod tcp;

use std::time::Duration;

use crate::http::HttpRequest;

pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

/// Stable handle identifying one connection for its whole lifetime
pub type SessionId = u64;

/// Outbound half of a connection, as seen by the streaming core
pub trait Transport {
    /// Bytes that can be accepted right now without blocking
    fn space(&self) -> usize;

    /// Buffer up to `data.len()` bytes for sending, returns how many were taken
    fn add(&mut self, data: &[u8]) -> usize;

    /// Whether buffered bytes can be pushed out now
    fn can_send(&self) -> bool;

    /// Push buffered bytes out, returns false if nothing could be sent
    fn send(&mut self) -> bool;

    /// Add then send immediately
    fn write(&mut self, data: &[u8]) -> usize {
        let added = self.add(data);
        if added > 0 && self.can_send() {
            self.send();
        }
        added
    }

    /// Whether the connection is still open
    fn connected(&self) -> bool;

    /// Close the connection; `abort` drops unsent data
    fn close(&mut self, abort: bool);
}

/// Asynchronous notification about a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// `len` previously sent bytes were accepted by the peer side
    Ack {
        /// Acknowledged byte count, cumulative across message boundaries
        len: usize,
        /// Time since the connection was opened
        time: Duration,
    },
    /// Idle heartbeat
    Poll,
    /// A write has been stalled for `elapsed`
    Timeout {
        /// How long the stall lasted
        elapsed: Duration,
    },
    /// Connection is gone
    Disconnect,
}

/// Everything a connection reports to the event loop, in arrival order
///
/// Requests and transport notifications share one channel so a connection's
/// `Disconnect` can never overtake its own `Request`.
#[derive(Debug)]
pub enum ConnectionEvent<T> {
    /// A request head was read; the transport is handed over with it
    Request {
        /// Connection id
        id: SessionId,
        /// Parsed request head
        request: HttpRequest,
        /// Outbound half of the connection
        transport: T,
    },
    /// Notification for an existing connection
    Transport {
        /// Connection id
        id: SessionId,
        /// What happened
        event: TransportEvent,
    },
}
