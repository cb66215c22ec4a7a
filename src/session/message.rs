//! Outbound message
//!
//! One encoded frame queued for a single session, with its own send and
//! acknowledgment cursors. The frame bytes themselves are reference counted,
//! so a broadcast shares one allocation across every session's copy.

use std::time::Duration;

use bytes::Bytes;

use crate::transport::Transport;

/// A queued frame and its delivery progress
///
/// Invariants: `acked <= sent <= len`. Sends are whole-or-nothing: either
/// every unsent byte is accepted by the transport or none is.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    data: Bytes,
    sent: usize,
    acked: usize,
}

impl OutboundMessage {
    /// Wrap a frame for delivery
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            sent: 0,
            acked: 0,
        }
    }

    /// Apply an acknowledgment of `len` bytes
    ///
    /// Returns the surplus that did not belong to this message. Acks are
    /// cumulative across messages, so the caller carries the surplus to the
    /// next one in the queue. Only bytes already sent can be acknowledged.
    pub fn ack(&mut self, len: usize, _time: Duration) -> usize {
        let take = len.min(self.sent - self.acked);
        self.acked += take;
        len - take
    }

    /// Try to hand every unsent byte to `transport`
    ///
    /// Returns the number of bytes submitted, 0 when the transport lacks room
    /// for all of them.
    pub fn send<T: Transport>(&mut self, transport: &mut T) -> usize {
        let unsent = &self.data[self.sent..];
        if transport.space() < unsent.len() {
            return 0;
        }

        let added = transport.add(unsent);
        if transport.can_send() {
            transport.send();
        }

        self.sent += added;
        added
    }

    /// Every byte has been acknowledged
    pub fn finished(&self) -> bool {
        self.acked == self.data.len()
    }

    /// Every byte has been handed to the transport
    pub fn sent(&self) -> bool {
        self.sent == self.data.len()
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes acknowledged so far
    pub fn acked_bytes(&self) -> usize {
        self.acked
    }

    /// Bytes submitted so far
    pub fn sent_bytes(&self) -> usize {
        self.sent
    }

    /// The frame
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}
