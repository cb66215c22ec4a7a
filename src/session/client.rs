//! Streaming client session
//!
//! A session owns one admitted connection and its FIFO of outbound messages.
//! It never reads from the client; everything it does is driven either by the
//! application queuing frames or by transport notifications:
//!
//! - `on_ack`: acknowledged bytes are applied front to back, surplus carried
//!   across message boundaries, finished messages released, then the queue
//!   is drained again
//!
//! Draining is strictly in order: it stops at the first message the transport
//! has no room for, so a later, smaller message never overtakes it.
//! - `on_poll`: drain if anything is waiting
//! - `on_timeout`: abort the connection
//! - `on_disconnect`: drop the transport; the owning source removes us
//!
//! The queue is capped. Once full, new messages are shed so a stalled client
//! can never grow memory without bound.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::message::OutboundMessage;
use crate::http::Request;
use crate::protocol::constants::{DEFAULT_MAX_QUEUED_MESSAGES, LAST_EVENT_ID_HEADER};
use crate::protocol::encode_event;
use crate::stats::SessionStats;
use crate::transport::{SessionId, Transport, TransportEvent};

/// One live event-stream connection
#[derive(Debug)]
pub struct ClientSession<T: Transport> {
    id: SessionId,
    /// `None` once the transport reported disconnect
    transport: Option<T>,
    queue: VecDeque<OutboundMessage>,
    max_queued: usize,
    /// Last event id the client saw before reconnecting, 0 if none
    last_id: u32,
    stats: SessionStats,
}

impl<T: Transport> ClientSession<T> {
    /// Create a session for an accepted request
    ///
    /// Reads `Last-Event-ID` from the request; a missing or non-numeric value
    /// counts as 0.
    pub fn new(id: SessionId, request: &dyn Request, transport: T) -> Self {
        let last_id = request
            .header(LAST_EVENT_ID_HEADER)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);

        Self {
            id,
            transport: Some(transport),
            queue: VecDeque::new(),
            max_queued: DEFAULT_MAX_QUEUED_MESSAGES,
            last_id,
            stats: SessionStats::new(),
        }
    }

    /// Set the queue cap
    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Last event id announced by the client
    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    /// Whether the connection is still usable
    pub fn connected(&self) -> bool {
        self.transport.as_ref().is_some_and(T::connected)
    }

    /// Messages queued and not yet fully acknowledged
    pub fn packets_waiting(&self) -> usize {
        self.queue.len()
    }

    /// Delivery counters
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// The underlying transport, while it exists
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Queue raw, already framed bytes
    pub fn write(&mut self, data: Bytes) {
        if !self.connected() {
            tracing::trace!(session_id = self.id, "Write after disconnect discarded");
            return;
        }

        if self.queue.len() >= self.max_queued {
            self.stats.messages_dropped += 1;
            tracing::error!(
                session_id = self.id,
                queued = self.queue.len(),
                dropped = self.stats.messages_dropped,
                "Too many messages queued, dropping newest"
            );
        } else {
            self.stats.bytes_queued += data.len() as u64;
            self.stats.messages_queued += 1;
            self.queue.push_back(OutboundMessage::new(data));
        }

        if self.transport.as_ref().is_some_and(T::can_send) {
            self.run_queue();
        }
    }

    /// Encode and queue one event
    pub fn send(&mut self, message: &str, event: Option<&str>, id: u32, retry: u32) {
        self.write(encode_event(message, event, id, retry));
    }

    /// Close the connection gracefully
    ///
    /// The session stays registered until the transport reports disconnect.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            if transport.connected() {
                transport.close(false);
            }
        }
    }

    /// Route a transport notification to its handler
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ack { len, time } => self.on_ack(len, time),
            TransportEvent::Poll => self.on_poll(),
            TransportEvent::Timeout { elapsed } => self.on_timeout(elapsed),
            TransportEvent::Disconnect => self.on_disconnect(),
        }
    }

    /// Apply an acknowledgment and keep draining
    pub fn on_ack(&mut self, len: usize, time: Duration) {
        let mut remaining = len;

        while remaining > 0 {
            let Some(front) = self.queue.front_mut() else {
                break;
            };

            let before = front.acked_bytes();
            remaining = front.ack(remaining, time);
            self.stats.bytes_acked += (front.acked_bytes() - before) as u64;

            if !front.finished() {
                break;
            }
            self.queue.pop_front();
            self.stats.messages_delivered += 1;
        }

        if remaining > 0 {
            tracing::trace!(session_id = self.id, surplus = remaining, "Ack beyond sent bytes ignored");
        }

        self.run_queue();
    }

    /// Idle heartbeat from the transport
    pub fn on_poll(&mut self) {
        if !self.queue.is_empty() {
            self.run_queue();
        }
    }

    /// A write stalled for too long; give up on this client
    pub fn on_timeout(&mut self, elapsed: Duration) {
        tracing::warn!(
            session_id = self.id,
            elapsed_ms = elapsed.as_millis() as u64,
            queued = self.queue.len(),
            "Client timed out, closing"
        );
        if let Some(transport) = self.transport.as_mut() {
            transport.close(true);
        }
    }

    /// The transport is gone; release it and everything queued
    pub fn on_disconnect(&mut self) {
        self.transport = None;

        if !self.queue.is_empty() {
            tracing::debug!(
                session_id = self.id,
                discarded = self.queue.len(),
                "Discarding undelivered messages"
            );
        }
        self.queue.clear();
    }

    /// Release finished messages, then submit unsent ones in order until one does not fit
    fn run_queue(&mut self) {
        while self.queue.front().is_some_and(OutboundMessage::finished) {
            self.queue.pop_front();
            self.stats.messages_delivered += 1;
        }

        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        for message in self.queue.iter_mut().filter(|message| !message.sent()) {
            let sent = message.send(transport);
            if sent == 0 {
                break;
            }
            self.stats.bytes_sent += sent as u64;
        }

        tracing::trace!(
            session_id = self.id,
            queued = self.queue.len(),
            space = transport.space(),
            "Queue drained"
        );
    }
}

impl<T: Transport> Drop for ClientSession<T> {
    fn drop(&mut self) {
        self.queue.clear();
        self.close();
    }
}
